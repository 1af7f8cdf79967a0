// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod dispatcher;

pub use dispatcher::Dispatcher;
