// The analyzers, leaves first. Nothing in here knows about requests, reports
// or worker pools; every function is a pure transform over images and maps.

pub mod raster;
pub mod filters;
pub mod texture_analyzer;
pub mod activation;
pub mod scorer;
pub mod colormap;
pub mod heatmap;
pub mod vegetation;
pub mod verdict;
pub mod image_helper;
