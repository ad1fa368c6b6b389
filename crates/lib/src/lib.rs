//! nativepack-lib: build orchestration for autotools-style native libraries.
//!
//! A build runs as a fixed pipeline:
//! - [`locate`]: resolve each required dependency to its include and lib dirs
//! - [`environment`]: turn those dirs and the build options into configure
//!   flags and child-process variables
//! - [`driver`]: run configure, make and make install in the source tree
//! - [`stage`]: copy the declared artifacts into a clean package layout
//! - [`store`]: commit the package under its content hash
//!
//! [`orchestrator::Orchestrator`] wires the steps together with a
//! [`fetch::Fetcher`] and an [`exec::Executor`].

pub mod consts;
pub mod driver;
pub mod environment;
pub mod exec;
pub mod fetch;
pub mod locate;
pub mod manifest;
pub mod orchestrator;
pub mod platform;
pub mod recipe;
pub mod stage;
pub mod store;
pub mod store_lock;
pub mod util;
