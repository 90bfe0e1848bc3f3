pub mod input_event;
