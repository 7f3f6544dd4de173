//! Tradelane Core -- the deterministic economy and logistics kernel of a
//! space-trading game.
//!
//! Stations, lanes, fleets, markets and industry sites live in one
//! [`sim::SimState`]. The [`kernel::Kernel`] owns it and advances it one
//! tick at a time through a fixed pipeline. Identical seeds and identical
//! input sequences reproduce byte-identical state, checked by the SHA-256
//! [`signature`].
//!
//! # Tick Pipeline
//!
//! Each call to [`kernel::Kernel::step`] runs:
//!
//! 1. **Lane flow** -- deliver and admit market-to-market transfers.
//! 2. **Program** -- run due programs; they only emit intents.
//! 3. **Intent** -- apply every due intent in sequence order.
//! 4. **Movement** -- advance fleets along their routes.
//! 5. **Fracture** -- off-lane travel.
//! 6. **Logistics** -- job phases and shortage-driven planning.
//! 7. **Industry** -- upkeep, production, degradation, construction.
//! 8. **Market** -- price publication and heat decay.
//! 9. **Risk** -- seeded lane incidents.
//! 10. **Containment** -- trace decay.
//! 11. **Intel** -- local market observation.
//!
//! Then event sequence numbers are finalized and the tick advances by one.
//!
//! # Commands and Intents
//!
//! ```rust,ignore
//! let mut kernel = Kernel::new(42);
//! kernel.generate_world(12, Fixed64::from_num(100))?;
//! // Applied now, or not at all.
//! kernel.enqueue_command(Command::Buy { market_id, good_id, quantity: 5 });
//! // Applied at the next intent step.
//! kernel.enqueue_intent(Intent::Sell { market_id, good_id, quantity: 5 });
//! kernel.step();
//! ```
//!
//! # Key Types
//!
//! - [`kernel::Kernel`] -- pipeline orchestrator and the only mutation surface.
//! - [`command::Command`] / [`intent::Intent`] -- synchronous and deferred input.
//! - [`content::ContentRegistry`] -- goods, recipes and modules with a digest.
//! - [`worldgen`] / [`world_loader`] -- the two producers of initial state.
//! - [`query`] -- read-only snapshots for rendering and UI.
//! - [`serialize`] -- the save envelope and bitcode snapshots.

pub mod command;
pub mod containment;
pub mod content;
pub mod event;
pub mod fixed;
pub mod fleet;
pub mod fracture;
pub mod industry;
pub mod intel;
pub mod intent;
pub mod kernel;
pub mod lane_flow;
pub mod ledger;
pub mod logistics;
pub mod market;
pub mod movement;
pub mod profiling;
pub mod program;
pub mod program_report;
pub mod query;
pub mod replay;
pub mod risk;
pub mod rng;
pub mod route;
pub mod schema;
pub mod serialize;
pub mod signature;
pub mod sim;
pub mod tweaks;
pub mod validation;
pub mod world;
pub mod world_loader;
pub mod worldgen;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
