#![forbid(unsafe_code)]

#[cfg(test)]
mod harness;
