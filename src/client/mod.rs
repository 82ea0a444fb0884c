// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Backend client: transport seam, retrying issuer and endpoint helpers

pub mod api;
pub mod http;
pub mod mock_transport;
pub mod retry;
pub mod transport;

pub use api::{ChatApi, UploadData, UploadFile, UploadReceipt};
pub use http::HttpTransport;
pub use mock_transport::{MockChunk, MockReply, MockStream, MockTransport};
pub use retry::{RetryConfig, RetryPolicy, RetryingRequestIssuer};
pub use transport::{ByteStream, HttpRequest, HttpResponse, Transport};
