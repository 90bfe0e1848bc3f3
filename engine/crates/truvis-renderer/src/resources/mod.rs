pub mod render_targets;
pub mod static_resources;
