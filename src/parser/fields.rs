use super::document::DocumentNode;
use super::units::{self, Unit};

/// Heading text that is also the name of the list field below it.
pub const RED_FLAGS: &str = "Red Flags";
/// A list entry longer than this is the comment block that follows the list.
pub const LIST_ENTRY_MAX_CHARS: usize = 20;

const ELEVATION: &str = "Elevation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub multiplicity: Multiplicity,
    pub kind: FieldKind,
    pub unit: Option<Unit>,
}

impl FieldSpec {
    pub const fn text(name: &'static str) -> Self {
        FieldSpec {
            name,
            multiplicity: Multiplicity::Single,
            kind: FieldKind::Text,
            unit: None,
        }
    }

    pub const fn numeric(name: &'static str, unit: Unit) -> Self {
        FieldSpec {
            name,
            multiplicity: Multiplicity::Single,
            kind: FieldKind::Numeric,
            unit: Some(unit),
        }
    }

    pub const fn multi(name: &'static str) -> Self {
        FieldSpec {
            name,
            multiplicity: Multiplicity::Multi,
            kind: FieldKind::Text,
            unit: None,
        }
    }

    /// Elevations are written `<thousands>,<remainder>'`.
    pub fn is_elevation(&self) -> bool {
        self.name == ELEVATION
    }

    /// Which occurrence of the label anchors a list field.
    fn anchor_occurrence(&self) -> usize {
        if self.name == RED_FLAGS {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

/// Ordered groups of fields read from one kind of report page.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    groups: Vec<FieldGroup>,
}

impl FieldSchema {
    pub fn new(groups: Vec<FieldGroup>) -> Self {
        FieldSchema { groups }
    }

    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.groups.iter().flat_map(|g| g.fields.iter())
    }

    /// Every section of a general observation page.
    pub fn general() -> Self {
        let group = |name, fields| FieldGroup { name, fields };
        FieldSchema::new(vec![
            group(
                "General",
                vec![
                    FieldSpec::text("Observer Name"),
                    FieldSpec::text("Observation Date"),
                    FieldSpec::text("Region"),
                    FieldSpec::text("Location Name or Route"),
                    FieldSpec::text("Comments"),
                ],
            ),
            group(
                "Weather",
                vec![
                    FieldSpec::text("Sky"),
                    FieldSpec::text("Wind Direction"),
                    FieldSpec::text("Wind Speed"),
                    FieldSpec::text("Weather Comments"),
                ],
            ),
            group(
                "Snow Characteristics",
                vec![
                    FieldSpec::numeric("New Snow Depth", Unit::Inches),
                    FieldSpec::text("New Snow Density"),
                    FieldSpec::multi("Snow Surface Conditions"),
                    FieldSpec::text("Snow Characteristics Comments"),
                ],
            ),
            group(
                "Red Flags",
                vec![FieldSpec::multi(RED_FLAGS), FieldSpec::text("Red Flags Comments")],
            ),
            group(
                "Avalanche Problem #1",
                vec![
                    FieldSpec::text("Problem"),
                    FieldSpec::text("Trend"),
                    FieldSpec::text("Problem #1 Comments"),
                ],
            ),
            group(
                "Avalanche Problem #2",
                vec![
                    FieldSpec::text("Problem"),
                    FieldSpec::text("Trend"),
                    FieldSpec::text("Problem #2 Comments"),
                ],
            ),
            group(
                "Snow Profile",
                vec![
                    FieldSpec::text("Aspect"),
                    FieldSpec::numeric(ELEVATION, Unit::Feet),
                    FieldSpec::numeric("Slope Angle", Unit::Degrees),
                ],
            ),
            group("Avalanche", avalanche_fields()),
        ])
    }

    /// Fields shared by every observation page.
    pub fn observation_common() -> Self {
        FieldSchema::new(vec![FieldGroup {
            name: "General",
            fields: vec![
                FieldSpec::text("Observer Name"),
                FieldSpec::text("Observation Date"),
                FieldSpec::text("Region"),
                FieldSpec::text("Location Name or Route"),
                FieldSpec::text("Snow Profile"),
                FieldSpec::text("Comments"),
            ],
        }])
    }

    /// Common fields followed by the avalanche details.
    pub fn avalanche() -> Self {
        let mut schema = Self::observation_common();
        schema.groups.push(FieldGroup {
            name: "Avalanche",
            fields: avalanche_fields(),
        });
        schema
    }
}

fn avalanche_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::numeric(ELEVATION, Unit::Feet),
        FieldSpec::text("Aspect"),
        FieldSpec::text("Trigger"),
        FieldSpec::numeric("Depth", Unit::Inches),
        FieldSpec::numeric("Width", Unit::Feet),
        FieldSpec::text("Carried"),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Cell text for tabular output. Absent becomes an empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(t) => t.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::List(items) => items.join("; "),
            FieldValue::Absent => String::new(),
        }
    }
}

/// Read one field below `node`. Anything that cannot be located is `Absent`.
pub fn read<N: DocumentNode>(field: &FieldSpec, node: N) -> FieldValue {
    match field.multiplicity {
        Multiplicity::Multi => node
            .values_after_label(field.name, field.anchor_occurrence(), |text| {
                text.chars().count() > LIST_ENTRY_MAX_CHARS
            })
            .map(FieldValue::List)
            .unwrap_or(FieldValue::Absent),
        Multiplicity::Single => {
            let Some(raw) = node.value_after_label(field.name).and_then(|n| n.string()) else {
                return FieldValue::Absent;
            };
            match field.kind {
                FieldKind::Text => FieldValue::Text(raw),
                FieldKind::Numeric => units::normalize(&raw, field)
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Absent),
            }
        }
    }
}
