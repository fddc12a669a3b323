pub mod persona;
pub mod registry;
pub mod runner;
pub mod service;
pub mod tracer;
pub mod transcript;

pub use persona::{Persona, PersonaLibrary, DEFAULT_PERSONA_PROMPT};
pub use registry::SimulationRegistry;
pub use runner::{BotProfile, SimulationOutcome, SimulationPlan, SimulationRunner};
pub use tracer::SimulationTracer;
pub use service::{import_transcripts, SimulationHandle, SimulationLauncher};
