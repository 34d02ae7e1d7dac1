use crate::output::is_quiet;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn banner(title: &str, subtitle: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("  {}", title.style(theme().header.clone()));
    println!("  {}", subtitle.style(theme().dim.clone()));
    println!();
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn reflection_added(id: i64, name: &str) {
    println!("{} #{} {}", Icons::NEW.style(theme().success.clone()), id, name);
}

pub fn reflection_updated(id: i64, name: &str) {
    println!("{} #{} {}", Icons::MOD.style(theme().warn.clone()), id, name);
}

pub fn reflection_deleted(id: i64) {
    println!("{} #{}", Icons::DEL.style(theme().error.clone()), id);
}

pub fn phase(name: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!(
        "{} {}",
        Icons::GEAR.style(theme().info.clone()),
        name.style(theme().header.clone())
    );
}

pub fn timing(elapsed: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CLOCK.style(theme().dim.clone()), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// Energy value with its sign, colored gain/drain
pub fn signed(value: i32) -> String {
    let style = match value.signum() {
        1 => theme().gain.clone(),
        -1 => theme().drain.clone(),
        _ => theme().muted.clone(),
    };
    format!("{:+}", value).style(style).to_string()
}
