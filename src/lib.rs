// fftool - media conversion core driven by ffmpeg

pub mod config;
pub mod engine;
