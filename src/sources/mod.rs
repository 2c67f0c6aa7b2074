//! Instrument-specific sources.
//!
//! Each source owns one parser plus the predicates that recognise its inputs.
//! Sources never reach into each other; shared axis handling lives in
//! [`common`].

pub mod callisto;
pub mod common;
pub mod eovsa;
pub mod ilofar;
pub mod rfs;
pub mod rpw;
pub mod rstn;
pub mod swaves;
pub mod waves;

use crate::data::registry::RegistryBuilder;

/// Register every built-in source. Order decides ties between predicates.
pub fn register_defaults(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(callisto::entry())
        .register(eovsa::entry())
        .register(rstn::entry())
        .register(swaves::entry())
        .register(waves::entry())
        .register(rfs::entry())
        .register(ilofar::entry())
        .register(rpw::entry())
}
