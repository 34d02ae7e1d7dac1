pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    banner, dim, error, header, info, muted, phase, reflection_added, reflection_deleted,
    reflection_updated, section, signed, status, success, summary_row, timing, warn,
};
pub use progress::Spinner;
pub use table::{averaged_table, axis_table, reflection_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
