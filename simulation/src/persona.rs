use std::path::Path;

use common::error::AppError;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_PERSONA_PROMPT: &str = "You are chatting with another AI.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub persona_name: String,
    #[serde(default)]
    pub scenario_name: String,
    #[serde(default)]
    pub system_prompt: String,
}

/// Simulated-user personas, usually loaded from a `personas.json` file.
#[derive(Debug, Clone, Default)]
pub struct PersonaLibrary {
    personas: Vec<Persona>,
}

impl PersonaLibrary {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let personas: Vec<Persona> = serde_json::from_str(json)?;
        Ok(Self::new(personas))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let library = Self::from_json(&raw)?;
        info!(path = %path.display(), personas = library.len(), "Loaded persona library");
        Ok(library)
    }

    /// Missing or malformed files yield an empty library.
    pub async fn load_or_empty(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path).await {
            Ok(library) => library,
            Err(err) => {
                warn!(path, error = %err, "Could not load personas, using default prompt");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn pick_random(&self) -> Option<&Persona> {
        self.personas.choose(&mut rand::thread_rng())
    }

    pub fn find_by_prompt(&self, system_prompt: &str) -> Option<&Persona> {
        self.personas
            .iter()
            .find(|persona| persona.system_prompt == system_prompt)
    }

    pub fn random_prompt(&self) -> String {
        self.pick_random()
            .map(|persona| persona.system_prompt.trim())
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_PERSONA_PROMPT)
            .to_string()
    }
}
