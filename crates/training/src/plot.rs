//! SVG diagnostic plots.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::prelude::*;

use models::{LayerKind, ModelTopology};

use crate::history::TrainingHistory;

/// Upper axis bound for values plotted from 0. Falls back to 1 when nothing is positive.
fn axis_upper(values: &[f32]) -> f32 {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Actual vs. predicted scatter with a `y = x` reference line.
///
/// Both axes start at 0, so negative predictions fall outside the view.
pub fn render_scatter(
    path: &Path,
    actual: &[f32],
    predicted: &[f32],
    size: (u32, u32),
) -> Result<()> {
    ensure_parent(path)?;
    let x_max = axis_upper(actual);
    let y_max = axis_upper(predicted);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow!("backend error: {e}"))?;
    {
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(0f32..x_max, 0f32..y_max)
            .map_err(|e| anyhow!("chart build error: {e}"))?;
        chart
            .configure_mesh()
            .x_desc("Actual")
            .y_desc("Predicted")
            .axis_desc_style(("sans-serif", 20))
            .draw()
            .map_err(|e| anyhow!("mesh error: {e}"))?;
        chart
            .draw_series(
                actual
                    .iter()
                    .zip(predicted)
                    .map(|(&a, &p)| Circle::new((a, p), 3, BLUE.mix(0.5).filled())),
            )
            .map_err(|e| anyhow!("draw error: {e}"))?;
        chart
            .draw_series(LineSeries::new([(0.0, 0.0), (x_max, x_max)], &RED))
            .map_err(|e| anyhow!("draw error: {e}"))?;
    }
    root.present()
        .map_err(|e| anyhow!("render error: {e}"))?;
    Ok(())
}

/// `(epoch, train_loss)` and `(epoch, val_loss)` points, keyed by the 1-based epoch.
fn loss_points(history: &TrainingHistory) -> (Vec<(f32, f32)>, Vec<(f32, f32)>) {
    history
        .records()
        .iter()
        .map(|r| ((r.epoch as f32, r.train_loss), (r.epoch as f32, r.val_loss)))
        .unzip()
}

/// Training and validation loss per epoch.
pub fn render_loss_curve(path: &Path, history: &TrainingHistory, size: (u32, u32)) -> Result<()> {
    ensure_parent(path)?;
    let (train, val) = loss_points(history);
    let last_epoch = history.len().max(2) as f32;
    let y_max = axis_upper(&history.train_losses()).max(axis_upper(&history.val_losses())) * 1.05;

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow!("backend error: {e}"))?;
    {
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(1f32..last_epoch, 0f32..y_max)
            .map_err(|e| anyhow!("chart build error: {e}"))?;
        chart
            .configure_mesh()
            .x_desc("Epoch")
            .y_desc("Loss (MSE)")
            .axis_desc_style(("sans-serif", 20))
            .draw()
            .map_err(|e| anyhow!("mesh error: {e}"))?;

        for (label, losses, color) in [
            ("Training loss", &train, BLUE),
            ("Validation loss", &val, RED),
        ] {
            chart
                .draw_series(LineSeries::new(losses.iter().copied(), &color))
                .map_err(|e| anyhow!("draw error: {e}"))?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| anyhow!("legend error: {e}"))?;
    }
    root.present()
        .map_err(|e| anyhow!("render error: {e}"))?;
    Ok(())
}

fn layer_fill(kind: &LayerKind) -> RGBColor {
    match kind {
        LayerKind::Conv2d { .. } => RGBColor(198, 219, 239),
        LayerKind::MaxPool2d { .. } => RGBColor(199, 233, 192),
        LayerKind::Dense { .. } => RGBColor(253, 208, 162),
        LayerKind::Flatten => RGBColor(218, 218, 235),
        LayerKind::Activation { .. } | LayerKind::Dropout { .. } => RGBColor(240, 240, 240),
    }
}

fn shape_label(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("({})", dims.join(", "))
}

/// Block diagram of the layer stack, top to bottom, one box per layer with
/// its output shape and parameter count.
pub fn render_architecture(path: &Path, topology: &ModelTopology, size: (u32, u32)) -> Result<()> {
    ensure_parent(path)?;
    let (width, height) = (size.0 as i32, size.1 as i32);
    let margin = 20;
    let header = 50;
    let rows = topology.layers.len().max(1) as i32;
    let row = ((height - header - 2 * margin) / rows).max(8);
    let gap = (row / 5).max(2);
    let font_px = (row - gap).clamp(6, 16);
    let (left, right) = (margin, width - margin);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow!("backend error: {e}"))?;
    let title = format!(
        "{}  input {}  params {}",
        topology.name,
        shape_label(&topology.input_shape),
        topology.total_params
    );
    root.draw(&Text::new(
        title,
        (left, margin),
        ("sans-serif", 18.0),
    ))
    .map_err(|e| anyhow!("draw error: {e}"))?;

    for (i, layer) in topology.layers.iter().enumerate() {
        let top = margin + header + i as i32 * row;
        let bottom = top + row - gap;
        root.draw(&Rectangle::new(
            [(left, top), (right, bottom)],
            layer_fill(&layer.kind).filled(),
        ))
        .map_err(|e| anyhow!("draw error: {e}"))?;
        root.draw(&Rectangle::new(
            [(left, top), (right, bottom)],
            BLACK.stroke_width(1),
        ))
        .map_err(|e| anyhow!("draw error: {e}"))?;
        let label = format!(
            "{}  out {}  params {}",
            layer.kind,
            shape_label(&layer.output_shape),
            layer.params
        );
        root.draw(&Text::new(
            label,
            (left + 8, top + (row - gap - font_px) / 2),
            ("sans-serif", font_px as f64),
        ))
        .map_err(|e| anyhow!("draw error: {e}"))?;
        if i + 1 < topology.layers.len() {
            let mid = (left + right) / 2;
            root.draw(&PathElement::new(vec![(mid, bottom), (mid, bottom + gap)], BLACK))
                .map_err(|e| anyhow!("draw error: {e}"))?;
        }
    }
    root.present()
        .map_err(|e| anyhow!("render error: {e}"))?;
    Ok(())
}
