pub mod mailer;
pub mod mention_source;
pub mod price_provider;
