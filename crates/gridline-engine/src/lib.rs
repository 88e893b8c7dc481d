pub mod cells;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod intercept;
pub mod meta;
pub mod ops;
pub mod render;
pub mod repair;
pub mod resize;
pub mod rewrite;
pub mod session;
pub mod styling;

// Re-export the embedder-facing surface
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use events::{EditorEvent, InputProfile, Key, KeyInput};
pub use host::{DocModel, DomCell, DomLine, DomTable, MemoryDoc, Position, Selection, StyledRun};
pub use intercept::{BlockReason, Decision};
pub use meta::{CELL_ATTRIBUTE, METADATA_ATTRIBUTE, TableMeta, resolve_meta};
pub use ops::{ColumnSide, RowTarget};
pub use repair::RepairOutcome;
pub use resize::{ResizeController, ResizePreview};
pub use session::{DeferredTask, Health, Session};
