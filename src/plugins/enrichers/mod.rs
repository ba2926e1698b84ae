pub mod strip_text;

pub use strip_text::StripTextEnricher;
