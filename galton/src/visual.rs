//! Figure rendering boundary
//!
//! Galton does not draw anything itself. A [`Visualizer`] receives the
//! clean sample by shared reference and hands back an opaque handle; a
//! failing visualizer never aborts a diagnosis.

use galton_core::{codes, CleanSample, Diagnostic, GaltonError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Opaque reference to a rendered figure (a path, URL or backend id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FigureHandle(String);

impl FigureHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

pub trait Visualizer: Send + Sync {
    fn render(&self, sample: &CleanSample, name: &str) -> Result<FigureHandle, GaltonError>;
}

impl<F> Visualizer for F
where
    F: Fn(&CleanSample, &str) -> Result<FigureHandle, GaltonError> + Send + Sync,
{
    fn render(&self, sample: &CleanSample, name: &str) -> Result<FigureHandle, GaltonError> {
        self(sample, name)
    }
}

/// Render, turning a failure into a logged warning
pub(crate) fn render_or_warn(
    visualizer: &dyn Visualizer,
    sample: &CleanSample,
    name: &str,
) -> (Option<FigureHandle>, Option<Diagnostic>) {
    match visualizer.render(sample, name) {
        Ok(handle) => (Some(handle), None),
        Err(e) => {
            warn!(sample = name, error = %e, "visualization failed, continuing without a figure");
            (
                None,
                Some(Diagnostic::warning(
                    codes::VISUALIZATION_FAILED,
                    format!("Could not render '{}': {}", name, e.message),
                )),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_visualizer() {
        let vis = |s: &CleanSample, name: &str| -> Result<FigureHandle, GaltonError> {
            Ok(FigureHandle::new(format!("{}-{}.png", name, s.len())))
        };
        let sample = CleanSample::from_raw("x", &[1.0, 2.0, f64::NAN]);
        let (handle, diagnostic) = render_or_warn(&vis, &sample, "RT");
        assert_eq!(handle.unwrap().id(), "RT-2.png");
        assert!(diagnostic.is_none());
    }

    #[test]
    fn test_failure_becomes_diagnostic() {
        let vis = |_: &CleanSample, _: &str| -> Result<FigureHandle, GaltonError> {
            Err(GaltonError::internal("no display"))
        };
        let sample = CleanSample::from_raw("x", &[1.0]);
        let (handle, diagnostic) = render_or_warn(&vis, &sample, "RT");
        assert!(handle.is_none());
        assert_eq!(diagnostic.unwrap().code, codes::VISUALIZATION_FAILED);
    }
}
