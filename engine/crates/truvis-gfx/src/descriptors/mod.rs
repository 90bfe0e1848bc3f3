pub mod descriptor;
pub mod descriptor_pool;
pub mod sampler;
pub mod write_descriptor_set;
