use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn color_coded_state_cell(state: &str) -> Cell {
    match state {
        "MERGED" => Cell::new(state).fg(TableColor::Green),
        "OPEN" => Cell::new(state).fg(TableColor::Yellow),
        "DECLINED" | "SUPERSEDED" => Cell::new(state).fg(TableColor::Red),
        _ => Cell::new(state),
    }
}

pub fn color_coded_approvals_cell(approvals: f64) -> Cell {
    let text = format!("{approvals:.1}");
    if approvals >= 2.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if approvals >= 1.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}
