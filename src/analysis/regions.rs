use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::SRegion;

/// Boxes closer than this many pixels are reported as one region.
const MERGE_GAP: u32 = 8;

/// Bounding boxes of the 8-connected clusters of non-zero pixels in `mask`.
pub fn find_highlighted_regions(mask: &GrayImage) -> Vec<SRegion> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut boxes: BTreeMap<u32, (u32, u32, u32, u32)> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }

        boxes
            .entry(label)
            .and_modify(|(x0, y0, x1, y1)| {
                *x0 = (*x0).min(x);
                *y0 = (*y0).min(y);
                *x1 = (*x1).max(x);
                *y1 = (*y1).max(y);
            })
            .or_insert((x, y, x, y));
    }

    let regions = boxes
        .into_values()
        .map(|(x0, y0, x1, y1)| SRegion {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
        .collect();

    merge_adjacent_regions(regions)
}

fn merge_adjacent_regions(regions: Vec<SRegion>) -> Vec<SRegion> {
    let mut merged: Vec<SRegion> = Vec::with_capacity(regions.len());

    for region in regions {
        let mut current = region;

        // Absorbing one box can bring it within reach of another already kept.
        loop {
            let Some(index) = merged.iter().position(|other| regions_adjacent(&current, other)) else {
                break;
            };
            let other = merged.swap_remove(index);
            current = merge_two_regions(&current, &other);
        }

        merged.push(current);
    }

    merged.sort_by_key(|r| (r.y, r.x));
    merged
}

fn regions_adjacent(a: &SRegion, b: &SRegion) -> bool {
    !(a.x + a.width + MERGE_GAP < b.x
        || b.x + b.width + MERGE_GAP < a.x
        || a.y + a.height + MERGE_GAP < b.y
        || b.y + b.height + MERGE_GAP < a.y)
}

fn merge_two_regions(a: &SRegion, b: &SRegion) -> SRegion {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let x2 = (a.x + a.width).max(b.x + b.width);
    let y2 = (a.y + a.height).max(b.y + b.height);

    SRegion {
        x,
        y,
        width: x2 - x,
        height: y2 - y,
    }
}
