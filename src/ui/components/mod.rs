pub mod chat_area;
pub mod sidebar;
pub mod status_bar;
