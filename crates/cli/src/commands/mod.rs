pub mod apply;
pub mod build_bafm;
pub mod optimize;
