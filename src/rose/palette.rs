use serde::Serialize;

pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DangerLevel {
    Low = 1,
    Moderate = 2,
    Considerable = 3,
    High = 4,
    Extreme = 5,
}

impl DangerLevel {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            DangerLevel::Low => "Low",
            DangerLevel::Moderate => "Moderate",
            DangerLevel::Considerable => "Considerable",
            DangerLevel::High => "High",
            DangerLevel::Extreme => "Extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Presence {
    Present,
    #[serde(rename = "Not Present")]
    NotPresent,
}

/// Reference colors for one decoding context.
///
/// Classification picks the entry with the smallest Manhattan distance. On a
/// tie the entry listed first wins; none of the reference colors below are
/// equidistant from anything the site renders.
#[derive(Debug, Clone, Copy)]
pub struct Palette<C: 'static> {
    entries: &'static [(C, Rgb)],
}

impl<C: Copy + 'static> Palette<C> {
    pub const fn new(entries: &'static [(C, Rgb)]) -> Self {
        assert!(!entries.is_empty(), "palette needs at least one color");
        Palette { entries }
    }

    pub fn classify(&self, rgb: Rgb) -> C {
        let (mut best, mut best_distance) = (self.entries[0].0, manhattan(self.entries[0].1, rgb));
        for (category, reference) in &self.entries[1..] {
            let distance = manhattan(*reference, rgb);
            if distance < best_distance {
                best = *category;
                best_distance = distance;
            }
        }
        best
    }
}

pub const DANGER: Palette<DangerLevel> = Palette::new(&[
    (DangerLevel::Low, [0, 255, 0]),
    (DangerLevel::Moderate, [255, 255, 0]),
    (DangerLevel::Considerable, [255, 128, 0]),
    (DangerLevel::High, [255, 0, 0]),
    (DangerLevel::Extreme, [0, 0, 0]),
]);

pub const PRESENCE: Palette<Presence> = Palette::new(&[
    (Presence::Present, [102, 178, 255]),
    (Presence::NotPresent, [192, 192, 192]),
]);

fn manhattan(a: Rgb, b: Rgb) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| u32::from(x.abs_diff(*y)))
        .sum()
}
