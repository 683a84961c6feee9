use tracing::warn;

use super::ExtractError;
use crate::parser::document::DocumentNode;

const ROSE_CLASSES: &str = "full-width compass-width sm-pb3";
const PROBLEM_CLASSES: &str = "text_01 mb0";

/// Image references and text of one avalanche problem, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemSource {
    pub label: String,
    pub kind: String,
    pub location_src: String,
    pub likelihood_src: Option<String>,
    pub size_src: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSource {
    pub rose_src: String,
    pub problems: Vec<ProblemSource>,
}

/// Locate the danger rose and the avalanche problems on a forecast page.
pub fn extract<N: DocumentNode>(root: N) -> Result<ForecastSource, ExtractError> {
    let rose_src = root
        .find_all_class(ROSE_CLASSES)
        .into_iter()
        .filter(|n| n.tag_name().as_deref() == Some("img"))
        .find_map(|n| n.attr("src"))
        .ok_or(ExtractError::MissingRose)?;

    let mut problems = Vec::new();
    for heading in root.find_all_class(PROBLEM_CLASSES) {
        match read_problem(heading) {
            Some(problem) => problems.push(problem),
            None => warn!(
                "Skipping avalanche problem with unexpected layout: {:?}",
                heading.string()
            ),
        }
    }

    Ok(ForecastSource { rose_src, problems })
}

// heading -> type two siblings on; body is the heading's grandparent two siblings on
fn read_problem<N: DocumentNode>(heading: N) -> Option<ProblemSource> {
    let label = heading.string()?.trim().to_string();
    let kind = heading.skip_one()?.string()?.trim().to_string();
    let body = heading.parent()?.parent()?.skip_one()?;

    let image = |name: &str| body.value_after_label(name).and_then(|n| n.attr("src"));
    let description = body
        .value_after_label("Description")
        .and_then(|n| n.children().get(1).and_then(|c| c.string()))
        .map(|d| d.trim().to_string());

    Some(ProblemSource {
        label,
        kind,
        location_src: image("Location")?,
        likelihood_src: image("Likelihood"),
        size_src: image("Size"),
        description,
    })
}
