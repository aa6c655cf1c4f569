//! 平台接口访问与资源解析。

pub mod catalog;
pub mod identifiers;
pub mod network;
pub mod resolver;
