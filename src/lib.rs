// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! # DataFusion Pulsar Provider
//!
//! This crate exposes Apache Pulsar topics to DataFusion as bounded tables.
//! A table reads every message between a start and an end boundary of each
//! topic-partition and returns them with the schema from
//! [`physical_plan::pulsar_schema`].
//!
//! ## Pipeline
//!
//! Every time a table is planned the following steps run:
//!
//! 1. **Topic selection**: [`topic::TopicStrategy`] (`topic`, `topics` or
//!    `topicsPattern`) becomes a set of fully-qualified topic names.
//! 2. **Partition enumeration**: each topic is expanded into its partitions
//!    through a [`catalog::PulsarCatalog`].
//! 3. **Boundary selection**: [`offsets::select_bounds`] picks the start and
//!    end boundary of each partition from the `startingOffsets` and
//!    `endingOffsets` options, filling in `earliest` and `latest` for
//!    partitions the options don't mention.
//! 4. **Validation**: [`offsets::RangeValidator`] rejects a `latest` start or
//!    an `earliest` end.
//! 5. **Resolution**: [`offsets::OffsetResolver`] turns the boundaries into
//!    concrete [`types::MessageId`]s against a [`catalog::BrokerSnapshot`].
//!
//! Steps 1 to 4 produce an [`offsets::RangePlan`]. Step 5 runs once when the
//! table is planned, so invalid ids fail fast, and again each time the
//! [`physical_plan::exec::scan::PulsarScanExec`] is executed:
//!
//! ```text
//! PulsarScanExec
//! └── RangePlan::resolve (fresh BrokerSnapshot)
//!     ├── MessageReader::read_range (partition 0)
//!     ├── MessageReader::read_range (partition 1)
//!     └── ...
//! ```
//!
//! A `latest` end is therefore bound to the tail of the partition at the
//! moment the scan starts. Executing the same plan after more messages were
//! published returns the new messages too. Explicit ids never move.
//!
//! ## Offsets
//!
//! Both offset options accept `earliest`, `latest` or a JSON object mapping
//! topic (or partition) names to `"earliest"`, `"latest"` or
//! `"<ledger>:<entry>:<partition>"`:
//!
//! ```text
//! {"persistent://public/default/t-partition-0":"3:15:0","persistent://public/default/u":"earliest"}
//! ```
//!
//! Ranges are inclusive on both ends. A range whose start lies after its end
//! is empty.
//!
//! ## Usage
//!
//! Register a [`provider::PulsarTableProvider`] directly, or register a
//! [`provider::PulsarTableFactory`] and use SQL:
//!
//! ```sql
//! CREATE EXTERNAL TABLE events STORED AS PULSAR
//! LOCATION 'pulsar://localhost:6650'
//! OPTIONS ('topicsPattern' 'events-.*', 'endingOffsets' 'latest');
//! ```
//!
//! [`memory::MemoryBroker`] is an in-process broker implementing both
//! collaborator traits.

pub mod catalog;
pub mod config;
pub mod error;
pub mod memory;
pub mod offsets;
pub mod physical_plan;
pub mod provider;
pub mod topic;
pub mod types;

pub use catalog::{BrokerSnapshot, PulsarCatalog};
pub use config::PulsarOptions;
pub use error::{PulsarError, Result};
pub use memory::MemoryBroker;
pub use offsets::{OffsetResolver, OffsetSpec, RangePlan};
pub use physical_plan::reader::{Message, MessageReader};
pub use provider::{PulsarTableFactory, PulsarTableProvider};
pub use topic::TopicStrategy;
pub use types::{MessageId, MessageIdBoundary, ResolvedRange, ResolvedRanges, TopicPartition};
