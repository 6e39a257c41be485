// Domain layer: the frame and report model plus the seams (ports) that
// sources, sinks, storage and configuration plug into.

pub mod model;
pub mod ports;
