pub mod check;
pub mod info;
pub mod preview;
pub mod reset;
pub mod run;
pub mod watch;
