// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod buffer_pool;
mod handler_context;
mod process_context;

pub use buffer_pool::{BufferPool, BufferPoolStats, PooledBuffer};
pub use handler_context::HandlerContext;
pub use process_context::ProcessContext;
