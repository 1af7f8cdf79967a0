// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod clock_trait;
mod software_clock;
mod tick;

pub use clock_trait::Clock;
pub use software_clock::SoftwareClock;
pub use tick::Tick;
