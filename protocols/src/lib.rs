//! Wire formats spoken by the `lanshare` resolver.

pub mod netbios;
