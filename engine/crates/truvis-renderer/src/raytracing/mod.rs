pub mod acceleration_builder;
pub mod sbt_layout;
