pub mod static_session;

pub use static_session::StaticSessionProvider;
