// Frame pipeline: pose → anchors → compositing

pub mod anchor;
pub mod composite;
pub mod frame;
pub mod pose;
pub mod types;
