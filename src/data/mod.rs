/// Data layer: core types, loading, filtering and matrix access.
///
/// Architecture:
/// ```text
///  metadata .csv            expression .parquet
///        │                          │
///        ▼                          ▼
///   ┌──────────┐            ┌────────────┐
///   │  loader   │ → Table   │ expression  │  requested gene columns only
///   └──────────┘            └────────────┘
///        │                          │
///        ▼                          │
///   ┌──────────┐   joins            │
///   │  model    │ ◄─────────────────┘
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  structure + neurotransmitter → surviving rows
///   └──────────┘
/// ```

pub mod expression;
pub mod filter;
pub mod loader;
pub mod model;
