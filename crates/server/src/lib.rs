pub mod dashboard;
pub mod flag_store;
pub mod flagging;
pub mod manager;
pub mod player_registry;
pub mod settings;
pub mod state;
pub mod zones;
