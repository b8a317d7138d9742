//! Cropping2D example

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use cellstack::layers::{Cropping2D, Cropping2DConfig, DataFormat};
use cellstack::Result;

type Backend = NdArray<f32>;

fn main() -> Result<()> {
    println!("=== Cropping2D Example ===\n");
    let device = Default::default();

    // channels last: [batch, height, width, channels]
    let images = Tensor::<Backend, 4>::random([3, 7, 9, 5], Distribution::Default, &device);
    let layer = Cropping2D::new(((1usize, 2usize), (3usize, 4usize)), DataFormat::ChannelsLast)?;
    println!("  {:?} -> {:?}", images.dims(), layer.forward(images)?.dims());

    // parsed from a layer config, channels first: [batch, channels, height, width]
    let config = Cropping2DConfig::from_json(r#"{"cropping": [2, 1], "data_format": "channels_first"}"#)?;
    let layer = config.init()?;
    let images = Tensor::<Backend, 4>::random([3, 5, 7, 9], Distribution::Default, &device);
    println!("  {:?} -> {:?}", images.dims(), layer.forward(images)?.dims());

    // a spatial dimension of unknown size passes through
    println!(
        "  dynamic width: {:?}",
        layer.compute_output_shape([Some(1), Some(5), Some(7), None])?
    );

    // cropping more than the input holds is an error
    let too_much = Cropping2D::new(((3usize, 6usize), (0usize, 0usize)), DataFormat::ChannelsLast)?;
    if let Err(err) = too_much.forward(Tensor::<Backend, 4>::zeros([3, 7, 9, 5], &device)) {
        println!("  rejected: {err}");
    }

    Ok(())
}
