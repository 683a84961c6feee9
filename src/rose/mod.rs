pub mod palette;
pub mod scale;

use std::collections::BTreeMap;
use std::fmt;

use image::RgbImage;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use palette::{Palette, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aspect {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Aspect {
    pub const ALL: [Aspect; 8] = [
        Aspect::N,
        Aspect::NE,
        Aspect::E,
        Aspect::SE,
        Aspect::S,
        Aspect::SW,
        Aspect::W,
        Aspect::NW,
    ];
}

/// Low is below 8,000', Mid 8,000'–9,500', High above 9,500'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElevationBand {
    Low,
    Mid,
    High,
}

impl ElevationBand {
    pub const ALL: [ElevationBand; 3] = [ElevationBand::Low, ElevationBand::Mid, ElevationBand::High];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoseKey {
    pub aspect: Aspect,
    pub band: ElevationBand,
}

impl fmt::Display for RoseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.aspect, self.band)
    }
}

pub const ROSE_KEYS: usize = Aspect::ALL.len() * ElevationBand::ALL.len();

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("sample ({x}, {y}) outside {width}x{height} image")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    #[error("image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

/// Category per aspect and elevation band. Always holds all 24 keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RoseMap<C> {
    cells: BTreeMap<RoseKey, C>,
}

impl<C: Copy> RoseMap<C> {
    pub fn get(&self, aspect: Aspect, band: ElevationBand) -> Option<C> {
        self.cells.get(&RoseKey { aspect, band }).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RoseKey, C)> + '_ {
        self.cells.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

impl<C: Serialize> Serialize for RoseMap<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// Hand-calibrated sample point for every rose key.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    points: Vec<(RoseKey, (u32, u32))>,
}

// (x, y) on the danger rose image
const DANGER_ROSE: [(Aspect, ElevationBand, (u32, u32)); ROSE_KEYS] = [
    (Aspect::N, ElevationBand::High, (200, 130)),
    (Aspect::NE, ElevationBand::High, (225, 135)),
    (Aspect::NW, ElevationBand::High, (175, 135)),
    (Aspect::W, ElevationBand::High, (165, 155)),
    (Aspect::E, ElevationBand::High, (235, 155)),
    (Aspect::SW, ElevationBand::High, (175, 175)),
    (Aspect::S, ElevationBand::High, (200, 185)),
    (Aspect::SE, ElevationBand::High, (225, 175)),
    (Aspect::N, ElevationBand::Mid, (200, 100)),
    (Aspect::NE, ElevationBand::Mid, (250, 115)),
    (Aspect::NW, ElevationBand::Mid, (150, 115)),
    (Aspect::W, ElevationBand::Mid, (125, 165)),
    (Aspect::E, ElevationBand::Mid, (275, 165)),
    (Aspect::SW, ElevationBand::Mid, (145, 215)),
    (Aspect::S, ElevationBand::Mid, (200, 230)),
    (Aspect::SE, ElevationBand::Mid, (255, 215)),
    (Aspect::N, ElevationBand::Low, (200, 65)),
    (Aspect::NE, ElevationBand::Low, (280, 100)),
    (Aspect::NW, ElevationBand::Low, (120, 100)),
    (Aspect::W, ElevationBand::Low, (75, 170)),
    (Aspect::E, ElevationBand::Low, (325, 170)),
    (Aspect::SW, ElevationBand::Low, (110, 250)),
    (Aspect::S, ElevationBand::Low, (200, 280)),
    (Aspect::SE, ElevationBand::Low, (290, 250)),
];

/// The location rose shares the danger rose layout with a wider crop.
const LOCATION_OFFSET: (u32, u32) = (30, 10);

impl CoordinateMap {
    pub fn danger_rose() -> Self {
        CoordinateMap {
            points: DANGER_ROSE
                .iter()
                .map(|(aspect, band, xy)| (RoseKey { aspect: *aspect, band: *band }, *xy))
                .collect(),
        }
    }

    pub fn location_rose() -> Self {
        Self::danger_rose().offset(LOCATION_OFFSET.0, LOCATION_OFFSET.1)
    }

    pub fn offset(mut self, dx: u32, dy: u32) -> Self {
        for (_, (x, y)) in &mut self.points {
            *x += dx;
            *y += dy;
        }
        self
    }

    pub fn points(&self) -> &[(RoseKey, (u32, u32))] {
        &self.points
    }
}

pub fn load_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub(crate) fn sample(image: &RgbImage, x: u32, y: u32) -> Result<Rgb, DecodeError> {
    image
        .get_pixel_checked(x, y)
        .map(|p| p.0)
        .ok_or(DecodeError::OutOfBounds {
            x,
            y,
            width: image.width(),
            height: image.height(),
        })
}

/// Classify every point of `coords`. One failed sample fails the whole rose.
pub fn decode<C: Copy + 'static>(
    image: &RgbImage,
    coords: &CoordinateMap,
    palette: &Palette<C>,
) -> Result<RoseMap<C>, DecodeError> {
    let mut cells = BTreeMap::new();
    for (key, (x, y)) in coords.points() {
        cells.insert(*key, palette.classify(sample(image, *x, *y)?));
    }
    Ok(RoseMap { cells })
}

#[cfg(test)]
mod tests {
    use super::palette::{DangerLevel, Presence, DANGER, PRESENCE};
    use super::*;

    fn filled(width: u32, height: u32, rgb: Rgb) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb(rgb))
    }

    #[test]
    fn danger_rose_has_every_key() {
        let coords = CoordinateMap::danger_rose();
        let mut keys: Vec<_> = coords.points().iter().map(|(k, _)| *k).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ROSE_KEYS);
    }

    #[test]
    fn location_rose_is_translated_danger_rose() {
        let danger = CoordinateMap::danger_rose();
        let location = CoordinateMap::location_rose();
        for ((k1, (x1, y1)), (k2, (x2, y2))) in danger.points().iter().zip(location.points()) {
            assert_eq!(k1, k2);
            assert_eq!((*x2, *y2), (x1 + 30, y1 + 10));
        }
    }

    #[test]
    fn decode_returns_all_keys_whatever_the_colors() {
        let mut img = filled(400, 300, [255, 255, 0]);
        // Paint the north-high sample red and south-low black.
        img.put_pixel(200, 130, image::Rgb([250, 5, 5]));
        img.put_pixel(200, 280, image::Rgb([3, 3, 3]));

        let rose = decode(&img, &CoordinateMap::danger_rose(), &DANGER).unwrap();
        assert_eq!(rose.len(), ROSE_KEYS);
        assert_eq!(rose.get(Aspect::N, ElevationBand::High), Some(DangerLevel::High));
        assert_eq!(rose.get(Aspect::S, ElevationBand::Low), Some(DangerLevel::Extreme));
        assert_eq!(rose.get(Aspect::E, ElevationBand::Mid), Some(DangerLevel::Moderate));
    }

    #[test]
    fn location_rose_decodes_presence() {
        let mut img = filled(400, 300, [192, 192, 192]);
        img.put_pixel(230, 140, image::Rgb([102, 178, 255]));
        let rose = decode(&img, &CoordinateMap::location_rose(), &PRESENCE).unwrap();
        assert_eq!(rose.len(), ROSE_KEYS);
        assert_eq!(rose.get(Aspect::N, ElevationBand::High), Some(Presence::Present));
        assert_eq!(
            rose.iter().filter(|(_, p)| *p == Presence::Present).count(),
            1
        );
    }

    #[test]
    fn small_image_fails_whole_rose() {
        let img = filled(300, 300, [0, 255, 0]);
        let err = decode(&img, &CoordinateMap::danger_rose(), &DANGER).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { x: 325, .. }));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(load_image(b"not an image"), Err(DecodeError::Image(_))));
    }

    #[test]
    fn serializes_with_readable_keys() {
        let img = filled(400, 300, [0, 255, 0]);
        let rose = decode(&img, &CoordinateMap::danger_rose(), &DANGER).unwrap();
        let json = serde_json::to_value(&rose).unwrap();
        assert_eq!(json["NE Mid"], "Low");
    }
}
