use image::RgbImage;
use serde::Serialize;

use super::palette::{Presence, PRESENCE};
use super::{sample, DecodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleReading {
    pub label: &'static str,
    pub ordinal: u8,
}

/// A vertical five-step scale, listed from the highest ordinal down.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    levels: [(&'static str, u8, (u32, u32)); 5],
}

pub const LIKELIHOOD: Scale = Scale {
    levels: [
        ("Certain", 5, (35, 9)),
        ("Very Likely", 4, (35, 68)),
        ("Likely", 3, (35, 125)),
        ("Somewhat Likely", 2, (35, 183)),
        ("Unlikely", 1, (35, 241)),
    ],
};

pub const SIZE: Scale = Scale {
    levels: [
        ("Large", 5, (35, 9)),
        ("Medium-Large", 4, (35, 68)),
        ("Medium", 3, (35, 125)),
        ("Medium-Small", 2, (35, 183)),
        ("Small", 1, (35, 241)),
    ],
};

impl Scale {
    /// Highest level whose marker reads as present, or `None` when no level
    /// is marked.
    pub fn read(&self, image: &RgbImage) -> Result<Option<ScaleReading>, DecodeError> {
        for (label, ordinal, (x, y)) in self.levels {
            if PRESENCE.classify(sample(image, x, y)?) == Presence::Present {
                return Ok(Some(ScaleReading { label, ordinal }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUE: image::Rgb<u8> = image::Rgb([102, 178, 255]);

    fn blank() -> RgbImage {
        RgbImage::from_pixel(70, 260, image::Rgb([192, 192, 192]))
    }

    #[test]
    fn reads_marked_level() {
        let mut img = blank();
        img.put_pixel(35, 125, BLUE);
        assert_eq!(
            LIKELIHOOD.read(&img).unwrap(),
            Some(ScaleReading { label: "Likely", ordinal: 3 })
        );
        assert_eq!(
            SIZE.read(&img).unwrap(),
            Some(ScaleReading { label: "Medium", ordinal: 3 })
        );
    }

    #[test]
    fn highest_marked_level_wins() {
        let mut img = blank();
        img.put_pixel(35, 241, BLUE);
        img.put_pixel(35, 68, BLUE);
        assert_eq!(SIZE.read(&img).unwrap().map(|r| r.ordinal), Some(4));
    }

    #[test]
    fn unmarked_scale_is_none_not_lowest() {
        assert_eq!(LIKELIHOOD.read(&blank()).unwrap(), None);
    }

    #[test]
    fn short_image_is_error() {
        let img = RgbImage::from_pixel(70, 100, image::Rgb([192, 192, 192]));
        assert!(matches!(
            LIKELIHOOD.read(&img),
            Err(DecodeError::OutOfBounds { y: 125, .. })
        ));
    }
}
