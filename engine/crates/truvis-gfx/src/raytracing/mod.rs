pub mod acceleration;
