//! # Color Module
//!
//! Instance colors for segmentation masks.
//!
//! ## Responsibilities
//! - **Shell assignment**: `assign_color` / `color_to_index`, a bijection between
//!   `[0, MAX_COLOR_INDEX]` and RGB triplets drawn from a 32 level channel palette.
//! - **Legacy color map**: `LegacyColorMap`, the brute-force enumeration used by the
//!   live vertex painting path. Its ordering differs from the shell scheme.
//! - **Registry**: `ColorRegistry`, the per-session mapping from paintable object
//!   to color that is persisted as `sceneObject.json`.
//!
//! Both schemes order colors so that consecutive indices land far apart in RGB
//! space. Index 0 is black, which masks read as "no object".

use crate::errors::RoxError;
use crate::types::{Rgb, SceneObject};
use rox_data::model::{SceneObjectEntry, SceneObjectsDocument, SceneObjectsFile};
use std::collections::HashMap;
use std::path::Path;
use tracing::{instrument, warn};

/// Channel intensities ordered by bit reversal: 0, then 255, then the
/// midpoints of every remaining interval at halving steps.
pub const CHANNEL_PALETTE: [u8; 32] = [
    0, 255, 127, 63, 191, 31, 95, 159, 223, 15, 47, 79, 111, 143, 175, 207, 239, 7, 23, 39, 55,
    71, 87, 103, 119, 135, 151, 167, 183, 199, 215, 231,
];

/// Largest index accepted by `assign_color`.
pub const MAX_COLOR_INDEX: u32 = 32759;

/// Returns the palette intensity for `rank`, or `None` past the palette.
pub fn channel_value(rank: u32) -> Option<u8> {
    CHANNEL_PALETTE.get(rank as usize).copied()
}

/// Inverse of `channel_value`.
pub fn channel_rank(value: u8) -> Option<u32> {
    CHANNEL_PALETTE
        .iter()
        .position(|&v| v == value)
        .map(|p| p as u32)
}

fn cube_root(n: u32) -> u32 {
    let mut v = (n as f64).cbrt() as u32;
    while (v + 1).pow(3) <= n {
        v += 1;
    }
    while v > 0 && v.pow(3) > n {
        v -= 1;
    }
    v
}

fn from_ranks(ranks: [u32; 3]) -> Rgb {
    let [r, g, b] = ranks.map(|rank| channel_value(rank).unwrap_or(0));
    Rgb::new(r, g, b)
}

/// Maps `idx` to its shell color.
///
/// Shell `val = floor(cbrt(idx))` holds every rank triplet whose largest rank is
/// `val`. Inside a shell the offset `idx - val³` walks three groups in order:
/// one channel pinned at `val` with two free channels below it (`3·val²`
/// variants), two channels pinned with one free (`3·val`), then all three pinned.
///
/// Indices above `MAX_COLOR_INDEX` return black.
pub fn assign_color(idx: u32) -> Rgb {
    if idx > MAX_COLOR_INDEX {
        warn!("Color index {} out of range [0, {}]", idx, MAX_COLOR_INDEX);
        return Rgb::BLACK;
    }

    let val = cube_root(idx);
    let mut offset = idx - val.pow(3);
    let sq = val * val;

    if offset < 3 * sq {
        let axis = offset / sq;
        let rem = offset % sq;
        let (a, b) = (rem / val, rem % val);
        let ranks = match axis {
            0 => [val, a, b],
            1 => [a, val, b],
            _ => [a, b, val],
        };
        return from_ranks(ranks);
    }
    offset -= 3 * sq;

    if offset < 3 * val {
        let axis = offset / val;
        let c = offset % val;
        let ranks = match axis {
            0 => [c, val, val],
            1 => [val, c, val],
            _ => [val, val, c],
        };
        return from_ranks(ranks);
    }

    from_ranks([val, val, val])
}

/// Recovers the index `assign_color` produced `color` from.
///
/// Returns `None` for channels outside the palette or indices above `MAX_COLOR_INDEX`.
pub fn color_to_index(color: Rgb) -> Option<u32> {
    let ranks = [
        channel_rank(color.r)?,
        channel_rank(color.g)?,
        channel_rank(color.b)?,
    ];
    let val = ranks.iter().copied().max().unwrap_or(0);
    let sq = val * val;
    let base = val.pow(3);
    let pinned = ranks.iter().filter(|&&r| r == val).count();

    let idx = match pinned {
        1 => {
            let axis = ranks.iter().position(|&r| r == val).unwrap_or(0) as u32;
            let free: Vec<u32> = ranks.iter().copied().filter(|&r| r != val).collect();
            base + axis * sq + free[0] * val + free[1]
        }
        2 => {
            let axis = ranks.iter().position(|&r| r != val).unwrap_or(0) as u32;
            base + 3 * sq + axis * val + ranks[axis as usize]
        }
        _ => base + 3 * sq + 3 * val,
    };

    (idx <= MAX_COLOR_INDEX).then_some(idx)
}

/// Precomputed colors of the vertex painting path.
///
/// For each max rank `m` in `0..32` the entries are generated by pinning subsets
/// of channels to `m` in the order B, G, GB, R, RB, RG, RGB, iterating the free
/// channels over `0..m` with red outermost. Black is skipped, leaving
/// `32³ - 1` entries.
#[derive(Clone, Debug)]
pub struct LegacyColorMap {
    colors: Vec<Rgb>,
}

impl LegacyColorMap {
    const PINS: [[bool; 3]; 7] = [
        [false, false, true],
        [false, true, false],
        [false, true, true],
        [true, false, false],
        [true, false, true],
        [true, true, false],
        [true, true, true],
    ];

    pub fn new() -> Self {
        let levels = CHANNEL_PALETTE.len() as u32;
        let mut colors = Vec::with_capacity((levels.pow(3) - 1) as usize);

        for max in 0..levels {
            for pins in Self::PINS {
                let span = |pinned: bool| if pinned { 1 } else { max };
                for i in 0..span(pins[0]) {
                    for j in 0..span(pins[1]) {
                        for k in 0..span(pins[2]) {
                            let pick = |pinned: bool, free: u32| if pinned { max } else { free };
                            let color =
                                from_ranks([pick(pins[0], i), pick(pins[1], j), pick(pins[2], k)]);
                            if color != Rgb::BLACK {
                                colors.push(color);
                            }
                        }
                    }
                }
            }
        }

        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color at `index`, or black when out of range.
    pub fn color(&self, index: usize) -> Rgb {
        match self.colors.get(index) {
            Some(c) => *c,
            None => {
                warn!(
                    "Object index {} is out of the color map boundary [0, {})",
                    index,
                    self.colors.len()
                );
                Rgb::BLACK
            }
        }
    }
}

impl Default for LegacyColorMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Which enumeration a `ColorRegistry` draws colors from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorScheme {
    /// `assign_color(slot + 1)`.
    #[default]
    Shell,
    /// `LegacyColorMap::color(slot)`.
    Legacy,
}

/// The paintable objects of one session and the colors they were given.
#[derive(Debug, Default)]
pub struct ColorRegistry {
    scheme: ColorScheme,
    legacy: Option<LegacyColorMap>,
    objects: Vec<SceneObject>,
    by_color: HashMap<Rgb, usize>,
}

impl ColorRegistry {
    pub fn new(scheme: ColorScheme) -> Self {
        let legacy = match scheme {
            ColorScheme::Legacy => Some(LegacyColorMap::new()),
            ColorScheme::Shell => None,
        };
        Self {
            scheme,
            legacy,
            objects: Vec::new(),
            by_color: HashMap::new(),
        }
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    /// Color for the `slot`-th paintable object.
    pub fn color_for_slot(&self, slot: usize) -> Rgb {
        match &self.legacy {
            Some(map) => map.color(slot),
            None => u32::try_from(slot + 1)
                .map(assign_color)
                .unwrap_or(Rgb::BLACK),
        }
    }

    /// Replaces the registry with `names`, colored in order.
    pub fn assign<S: AsRef<str>>(&mut self, names: &[S]) -> &[SceneObject] {
        self.objects = names
            .iter()
            .enumerate()
            .map(|(slot, name)| SceneObject {
                instance_name: name.as_ref().to_string(),
                color: self.color_for_slot(slot),
                class: "none".to_string(),
            })
            .collect();
        self.reindex();
        &self.objects
    }

    fn reindex(&mut self) {
        self.by_color = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.color, i))
            .collect();
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The object a mask pixel of `color` belongs to.
    pub fn find_by_color(&self, color: Rgb) -> Option<&SceneObject> {
        self.by_color.get(&color).map(|&i| &self.objects[i])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.instance_name == name)
    }

    pub fn to_document(&self) -> SceneObjectsDocument {
        SceneObjectsDocument {
            scene_objects: self
                .objects
                .iter()
                .map(|o| SceneObjectEntry {
                    instance_name: o.instance_name.clone(),
                    instance_color: o.color.into(),
                    class: o.class.clone(),
                })
                .collect(),
        }
    }

    /// Writes the registry as `{"SceneObjects": [...]}`.
    #[instrument(level = "debug", skip(self), fields(objects = self.objects.len()))]
    pub fn write_json(&self, path: &Path) -> Result<(), RoxError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a persisted registry so a replay reuses the colors of an earlier session.
    ///
    /// Accepts both the wrapped document and a bare array of entries.
    pub fn read_json(path: &Path, scheme: ColorScheme) -> Result<Self, RoxError> {
        let text = std::fs::read_to_string(path)?;
        let file: SceneObjectsFile = serde_json::from_str(&text)?;
        let mut registry = Self::new(scheme);
        registry.objects = file
            .into_entries()
            .into_iter()
            .map(|e| SceneObject {
                instance_name: e.instance_name,
                color: e.instance_color.into(),
                class: e.class,
            })
            .collect();
        registry.reindex();
        Ok(registry)
    }
}
