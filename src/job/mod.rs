//! The job subsystem: the Parcel Job record, its persistence, the single
//! worker that executes it, the retention sweep, and startup recovery.

pub mod executor;
pub mod model;
pub mod recovery;
pub mod repository;
pub mod sweeper;
