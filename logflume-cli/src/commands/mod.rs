//! 서브커맨드 구현

pub mod check;
pub mod run;
