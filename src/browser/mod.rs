pub mod chrome;
pub mod driver;
pub mod probe;

pub use chrome::ChromeDriver;
pub use driver::{js_lookup, DomScope, ElementHandle, PageDriver};
pub use probe::{HttpResourceProbe, ResourceProbe};

#[cfg(test)]
pub use driver::MockPageDriver;
#[cfg(test)]
pub use probe::MockResourceProbe;
