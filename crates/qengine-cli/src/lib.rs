// Copyright 2025 qengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # qengine CLI
//!
//! Command-line reader for tables held by a Qlik Engine.
//!
//! ## Key Commands
//!
//! - `qengine fetch <app> <table>`: read one page of a table as JSON
//! - `qengine fields <app>`: list an app's fields with type and cardinality
//! - `qengine tables <app>`: list an app's data-model tables
//!
//! Connection settings come from the `QLIK_*` environment variables; the
//! global options override them. Results go to stdout as JSON, logs go to
//! stderr.

pub mod options;
pub mod output;
