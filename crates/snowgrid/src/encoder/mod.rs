mod interface;
mod snowflake;
#[cfg(test)]
mod tests;
mod value;

pub use interface::*;
pub use snowflake::*;
pub use value::*;
