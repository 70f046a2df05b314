//! Publish bundle.
//! Writes climbs.json (2-space pretty) next to an images folder holding one
//! composited `<id>.png` per climb, ready to drop into a static site root.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Component, Path};

use crate::climb::{ClimbRecord, IMAGES_FOLDER, default_image_path};
use crate::compositor;
use crate::store::export_pretty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub climbs: usize,
    pub images: usize,
}

/// File name the compositor output is published under, or `None` when the
/// id would not stay inside the images folder.
pub fn image_file_name(id: &str) -> Option<String> {
    let name = format!("{}.png", id);
    let mut components = Path::new(&name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(name),
        _ => None,
    }
}

pub fn write_bundle(
    climbs: &[ClimbRecord],
    reference: &DynamicImage,
    out_dir: &Path,
    data_file: &str,
) -> Result<ExportSummary> {
    let images_dir = out_dir.join(IMAGES_FOLDER);
    fs::create_dir_all(&images_dir)
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;

    let json_path = out_dir.join(data_file);
    fs::write(&json_path, export_pretty(climbs)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let mut images = 0;
    for climb in climbs {
        if climb.id.is_empty() {
            log::warn!("Skipping image for climb '{}' without an id", climb.name);
            continue;
        }
        let Some(file_name) = image_file_name(&climb.id) else {
            log::warn!("Skipping image for climb with unsafe id '{}'", climb.id);
            continue;
        };
        if climb.image != default_image_path(&climb.id) {
            log::info!("Climb {} points at custom image {}", climb.id, climb.image);
        }
        let png = compositor::render(reference, climb)
            .with_context(|| format!("Failed to render climb {}", climb.id))?;
        let path = images_dir.join(file_name);
        fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
        images += 1;
    }

    log::info!("Exported {} climbs and {} images to {}", climbs.len(), images, out_dir.display());
    Ok(ExportSummary {
        climbs: climbs.len(),
        images,
    })
}
