pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const NEW: &str = "✨";
    pub const MOD: &str = "📝";
    pub const DEL: &str = "🗑️";
    pub const DATABASE: &str = "🗄️";
    pub const CLOCK: &str = "⏱️";
    pub const UP: &str = "⬆️";
    pub const DOWN: &str = "⬇️";
    pub const RIGHT: &str = "➡️";
    pub const GEAR: &str = "⚙️";
    pub const WAVE: &str = "🌊";
    pub const PACKAGE: &str = "📦";
}
