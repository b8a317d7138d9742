//! 2D cropping along the spatial axes of image batches.

use std::ops::Range;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// Position of the channel axis in 4D image tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// `[batch, height, width, channels]`
    #[default]
    ChannelsLast,
    /// `[batch, channels, height, width]`
    ChannelsFirst,
}

/// Cropping amounts as written in a layer config.
///
/// - `Uniform(c)`: crop `c` from all four sides.
/// - `Symmetric([h, w])`: crop `h` from top and bottom, `w` from left and right.
/// - `Explicit([[top, bottom], [left, right]])`.
///
/// Values are signed so that malformed configs can be represented and rejected by
/// [`CroppingArg::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CroppingArg {
    Uniform(i64),
    Symmetric(Vec<i64>),
    Explicit(Vec<Vec<i64>>),
}

impl CroppingArg {
    /// Resolve to `[[top, bottom], [left, right]]`.
    pub fn normalize(&self) -> Result<[[usize; 2]; 2]> {
        match self {
            Self::Uniform(value) => {
                let value = non_negative(*value)?;
                Ok([[value, value], [value, value]])
            }
            Self::Symmetric(values) => {
                if values.len() != 2 {
                    return Err(NnError::configuration(format!(
                        "`cropping` should have two elements, received {values:?}"
                    )));
                }
                let height = non_negative(values[0])?;
                let width = non_negative(values[1])?;
                Ok([[height, height], [width, width]])
            }
            Self::Explicit(pairs) => {
                if pairs.len() != 2 {
                    return Err(NnError::configuration(format!(
                        "`cropping` should have two elements, received {pairs:?}"
                    )));
                }
                let mut resolved = [[0usize; 2]; 2];
                for (axis, pair) in pairs.iter().enumerate() {
                    if pair.len() != 2 {
                        return Err(NnError::configuration(format!(
                            "`cropping[{axis}]` should be a (start, end) pair, received {pair:?}"
                        )));
                    }
                    resolved[axis] = [non_negative(pair[0])?, non_negative(pair[1])?];
                }
                Ok(resolved)
            }
        }
    }
}

fn non_negative(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        NnError::configuration(format!(
            "`cropping` values should be non-negative, received {value}"
        ))
    })
}

/// Values beyond `i64::MAX` saturate; they crop more than any tensor holds and
/// are rejected against the input shape.
fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl From<usize> for CroppingArg {
    fn from(value: usize) -> Self {
        Self::Uniform(saturating_i64(value))
    }
}

impl From<(usize, usize)> for CroppingArg {
    fn from((height, width): (usize, usize)) -> Self {
        Self::Symmetric(vec![saturating_i64(height), saturating_i64(width)])
    }
}

impl From<((usize, usize), (usize, usize))> for CroppingArg {
    fn from(((top, bottom), (left, right)): ((usize, usize), (usize, usize))) -> Self {
        Self::Explicit(vec![
            vec![saturating_i64(top), saturating_i64(bottom)],
            vec![saturating_i64(left), saturating_i64(right)],
        ])
    }
}

/// Configuration for [`Cropping2D`].
#[derive(Config, Debug)]
pub struct Cropping2DConfig {
    pub cropping: CroppingArg,
    #[config(default = "DataFormat::ChannelsLast")]
    pub data_format: DataFormat,
}

impl Cropping2DConfig {
    /// Parse a config from JSON, reporting malformed cropping values as
    /// configuration errors.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn init(&self) -> Result<Cropping2D> {
        Ok(Cropping2D {
            cropping: self.cropping.normalize()?,
            data_format: self.data_format,
        })
    }
}

/// Crops rows and columns off the spatial axes of a 4D tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cropping2D {
    cropping: [[usize; 2]; 2],
    data_format: DataFormat,
}

impl Cropping2D {
    pub fn new(cropping: impl Into<CroppingArg>, data_format: DataFormat) -> Result<Self> {
        Cropping2DConfig::new(cropping.into())
            .with_data_format(data_format)
            .init()
    }

    /// `[[top, bottom], [left, right]]`
    pub fn cropping(&self) -> [[usize; 2]; 2] {
        self.cropping
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    /// Indices of the height and width axes.
    fn spatial_axes(&self) -> [usize; 2] {
        match self.data_format {
            DataFormat::ChannelsLast => [1, 2],
            DataFormat::ChannelsFirst => [2, 3],
        }
    }

    fn kept_range(&self, spatial: usize, len: usize) -> Result<Range<usize>> {
        let [start, end] = self.cropping[spatial];
        if start.saturating_add(end) >= len {
            return Err(NnError::configuration(format!(
                "cropping {:?} leaves nothing of spatial dimension {} (size {len})",
                self.cropping[spatial], spatial
            )));
        }
        Ok(start..len - end)
    }

    /// Output shape for an input shape whose dimensions may be unknown.
    pub fn compute_output_shape(&self, input_shape: [Option<usize>; 4]) -> Result<[Option<usize>; 4]> {
        let mut output = input_shape;
        for (spatial, axis) in self.spatial_axes().into_iter().enumerate() {
            if let Some(len) = input_shape[axis] {
                output[axis] = Some(self.kept_range(spatial, len)?.len());
            }
        }
        Ok(output)
    }

    /// Crop the spatial axes of a batch.
    ///
    /// # Arguments
    /// * `input` - Tensor laid out according to [`Self::data_format`]
    ///
    /// # Returns
    /// The cropped tensor; batch and channel axes are untouched. Fails with a
    /// configuration error if a crop would leave a spatial axis empty.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let dims = input.dims();
        let mut ranges = dims.map(|len| 0..len);
        for (spatial, axis) in self.spatial_axes().into_iter().enumerate() {
            ranges[axis] = self.kept_range(spatial, dims[axis])?;
        }
        Ok(input.slice(ranges))
    }
}
