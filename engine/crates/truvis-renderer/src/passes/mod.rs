pub mod present_copy_pass;
pub mod raster_pass;
pub mod rt_pass;
