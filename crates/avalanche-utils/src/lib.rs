//! Utilities shared by the Snow consensus crates:
//! - [`Bag`]: multiset of votes with threshold tracking
//! - [`UniqueBag`]: element -> set of distinct voters
//! - [`clock::Clock`]: wall clock that tests can freeze and advance
//! - [`timer::Timer`]: re-armable, cancellable deadline driven by tokio
//! - [`logging`]: tracing subscriber setup

pub mod bag;
pub mod clock;
pub mod logging;
pub mod timer;
pub mod unique_bag;

pub use bag::Bag;
pub use clock::Clock;
pub use unique_bag::UniqueBag;
