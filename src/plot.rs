//! Renders learned weights, input images and training curves as PNG files
//!
//! Weights use a diverging palette: negative values are blue, positive values are red and zero is
//! white. Input images are drawn in grayscale.

use std::error::Error;

use plotters::{
    chart::ChartBuilder,
    coord::Shift,
    prelude::{BitMapBackend, DrawingArea, IntoDrawingArea, Rectangle},
    series::LineSeries,
    style::{BLUE, Color, RED, RGBColor, WHITE},
};

use crate::{
    datasets::{IMAGE_HEIGHT, IMAGE_WIDTH, N_FEATURES, Sample},
    train::EpochReport,
};

/// How values are mapped to colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    /// Symmetric around zero, scaled by the largest magnitude
    Diverging,
    /// `0.0` is black and `1.0` is white
    Grayscale,
}

/// Maps `value` to a color, `scale` being the magnitude that saturates the diverging palette
pub fn color(value: f32, scale: f32, palette: Palette) -> RGBColor {
    match palette {
        Palette::Diverging => {
            let t = if scale > 0.0 {
                (value / scale).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            let fade = (255.0 * (1.0 - t.abs())).round() as u8;
            if t >= 0.0 {
                RGBColor(255, fade, fade)
            } else {
                RGBColor(fade, fade, 255)
            }
        }
        Palette::Grayscale => {
            let level = (255.0 * value.clamp(0.0, 1.0)).round() as u8;
            RGBColor(level, level, level)
        }
    }
}

fn check_image(values: &[f32]) -> Result<(), Box<dyn Error>> {
    if values.len() != N_FEATURES {
        return Err(format!(
            "Expected {} values for a {}x{} image, got {}",
            N_FEATURES,
            IMAGE_HEIGHT,
            IMAGE_WIDTH,
            values.len()
        )
        .into());
    }
    Ok(())
}

fn draw_image(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    values: &[f32],
    caption: &str,
    palette: Palette,
) -> Result<(), Box<dyn Error>> {
    let scale = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 14))
        .margin(4)
        .build_cartesian_2d(0..IMAGE_WIDTH as i32, 0..IMAGE_HEIGHT as i32)?;

    // row 0 of the image is drawn at the top
    chart.draw_series(values.iter().enumerate().map(|(i, &v)| {
        let x = (i % IMAGE_WIDTH) as i32;
        let y = (IMAGE_HEIGHT - 1 - i / IMAGE_WIDTH) as i32;
        Rectangle::new([(x, y), (x + 1, y + 1)], color(v, scale, palette).filled())
    }))?;
    Ok(())
}

fn draw_grid(
    images: &[(String, &[f32])],
    cols: usize,
    palette: Palette,
    file_name: &str,
) -> Result<(), Box<dyn Error>> {
    for (_, values) in images {
        check_image(values)?;
    }
    let cols = cols.clamp(1, images.len().max(1));
    let rows = images.len().div_ceil(cols).max(1);

    let root_area =
        BitMapBackend::new(file_name, (160 * cols as u32, 170 * rows as u32)).into_drawing_area();
    root_area.fill(&WHITE)?;
    for (area, (caption, values)) in root_area.split_evenly((rows, cols)).iter().zip(images) {
        draw_image(area, values, caption, palette)?;
    }
    root_area.present()?;
    Ok(())
}

/// Plots a single weight vector as a 28x28 image
pub fn plot_weight_image(weights: &[f32], title: &str, file_name: &str) -> Result<(), Box<dyn Error>> {
    check_image(weights)?;
    let root_area = BitMapBackend::new(file_name, (480, 500)).into_drawing_area();
    root_area.fill(&WHITE)?;
    draw_image(&root_area, weights, title, Palette::Diverging)?;
    root_area.present()?;
    log::info!("Weight image saved to '{}'.", file_name);
    Ok(())
}

/// Plots the incoming weights of several hidden units, `cols` images per row
pub fn plot_weight_grid(weights: &[Vec<f32>], cols: usize, file_name: &str) -> Result<(), Box<dyn Error>> {
    let images = weights
        .iter()
        .enumerate()
        .map(|(unit, w)| (format!("unit {}", unit), w.as_slice()))
        .collect::<Vec<_>>();
    draw_grid(&images, cols, Palette::Diverging, file_name)?;
    log::info!("Weights of {} hidden units saved to '{}'.", weights.len(), file_name);
    Ok(())
}

/// Plots input images with their labels
pub fn plot_samples(samples: &[Sample], cols: usize, file_name: &str) -> Result<(), Box<dyn Error>> {
    let images = samples
        .iter()
        .map(|s| (format!("label {}", s.label), s.features.as_slice()))
        .collect::<Vec<_>>();
    draw_grid(&images, cols, Palette::Grayscale, file_name)?;
    log::info!("Sample images saved to '{}'.", file_name);
    Ok(())
}

/// Plots test accuracy (top) and last batch loss (bottom) per epoch
pub fn plot_history(reports: &[EpochReport], file_name: &str) -> Result<(), Box<dyn Error>> {
    if reports.is_empty() {
        return Err("No epochs to plot".into());
    }
    let root_area = BitMapBackend::new(file_name, (640, 720)).into_drawing_area();
    root_area.fill(&WHITE)?;
    let (upper, lower) = root_area.split_vertically(360);

    let n_epochs = reports.len() as f32;
    let max_loss = reports
        .iter()
        .map(|r| r.loss)
        .filter(|l| l.is_finite())
        .fold(0.0f32, f32::max)
        .max(1e-3);

    let mut chart = ChartBuilder::on(&upper)
        .caption("Test accuracy (%)", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0f32..n_epochs, 0.0f32..100.0f32)?;
    chart.configure_mesh().x_desc("epoch").draw()?;
    chart.draw_series(LineSeries::new(
        reports.iter().map(|r| (r.epoch as f32, r.accuracy)),
        &RED,
    ))?;

    let mut chart = ChartBuilder::on(&lower)
        .caption("Last batch loss", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0f32..n_epochs, 0.0f32..max_loss * 1.1)?;
    chart.configure_mesh().x_desc("epoch").draw()?;
    chart.draw_series(LineSeries::new(
        reports.iter().map(|r| (r.epoch as f32, r.loss)),
        &BLUE,
    ))?;

    root_area.present()?;
    log::info!("Training history plot saved to '{}'.", file_name);
    Ok(())
}
