//! Built-in archive formats.
//!
//! | id | Layout |
//! |----|--------|
//! | [`zip`] | ZIP / ZIP64, including Star Citizen P4K |
//! | [`bsa`] | Morrowind BSA (read and write) |
//! | [`pak`] | id Software PACK (read and write) |
//! | [`danae`] | Arx Fatalis PAK |

pub mod bsa;
pub mod danae;
pub mod pak;
pub mod zip;
