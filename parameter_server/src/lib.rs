//! In process stand-in for the distributed parameter store.
//!
//! The worker side only talks to the `Table` and `KvTable` traits, any store
//! providing per row atomic reads and additive updates can be plugged in.

pub mod initialization;
pub mod storage;
