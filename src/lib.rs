//! # Open Data Harvester
//!
//! A harvester for Greek open-data portals: it enumerates remote catalogs,
//! normalizes every record onto a canonical DCAT-AP-flavored dataset
//! shape, and upserts the results into a local SQLite catalog.
//!
//! ```text
//! ┌─────────────┐   gather    ┌───────────┐   diff    ┌──────────────┐
//! │   Source    │ ──────────► │  GUIDs +  │ ────────► │ new/changed/ │
//! │  adapters   │             │  records  │           │   deleted    │
//! └─────────────┘             └───────────┘           └──────┬───────┘
//!                                                           │ fetch
//!                                                           ▼ import
//! ┌─────────────┐   upsert    ┌───────────┐   run    ┌──────────────┐
//! │   SQLite    │ ◄────────── │ normalized│ ◄─────── │  normalizer  │
//! │   catalog   │             │  dataset  │          │    chain     │
//! └─────────────┘             └───────────┘          └──────────────┘
//! ```
//!
//! | Module       | Responsibility                                        |
//! |--------------|-------------------------------------------------------|
//! | `config`     | TOML configuration and per-source settings            |
//! | `db`         | SQLite pool setup                                     |
//! | `migrate`    | Idempotent schema migrations                          |
//! | `models`     | Jobs, harvest objects, the canonical dataset record   |
//! | `fetch`      | Throttled HTTP fetcher                                |
//! | `parse`      | data.json and DCAT-AP RDF/XML parsing                 |
//! | `gather`     | GUID diffing against the known current set            |
//! | `importer`   | Raw value → dataset mapping, names, text cleanup      |
//! | `normalize`  | The fixed seven-stage normalizer chain                |
//! | `vocab`      | Controlled vocabulary store and resolver cache        |
//! | `upsert`     | Catalog store and created/updated/unchanged commits   |
//! | `harvesters` | The source adapters and their registry                |
//! | `job`        | The per-source run driver                             |
//! | `report`     | Job listings and error reports                        |
//! | `sources`    | Configured source overview                            |

pub mod config;
pub mod db;
pub mod fetch;
pub mod gather;
pub mod harvesters;
pub mod importer;
pub mod job;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod report;
pub mod sources;
pub mod upsert;
pub mod vocab;
