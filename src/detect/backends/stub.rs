use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// One scripted answer from [`StubBackend`].
#[derive(Clone, Debug)]
pub enum StubResponse {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Scripted backend for tests and model-less deployments.
///
/// Each `detect` call returns the next scripted response, cycling through the
/// script. An empty script always returns no detections.
pub struct StubBackend {
    script: Vec<StubResponse>,
    calls: usize,
    class_names: Vec<String>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            calls: 0,
            class_names: Vec::new(),
        }
    }

    /// Always answer with the same detections.
    pub fn always(detections: Vec<Detection>) -> Self {
        Self::new().with_script(vec![StubResponse::Detections(detections)])
    }

    pub fn with_script(mut self, script: Vec<StubResponse>) -> Self {
        self.script = script;
        self
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        let index = self.calls;
        self.calls += 1;
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        match &self.script[index % self.script.len()] {
            StubResponse::Detections(detections) => Ok(detections.clone()),
            StubResponse::Failure(reason) => Err(anyhow!("{}", reason)),
        }
    }
}
