pub mod color;
pub mod flatten;
pub mod raster_walk;
pub mod sink;
pub mod tokenizer;
