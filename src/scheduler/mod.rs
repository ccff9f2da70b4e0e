pub mod engine;

pub(crate) use engine::Engine;
