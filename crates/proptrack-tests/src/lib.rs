//! Integration test crate for Proptrack.
//!
//! Cross-crate scenarios run against in-memory stand-ins for the media tool
//! and the point tracker, so neither FFmpeg nor a tracking service is needed.

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod service;

#[cfg(test)]
mod tracking;
