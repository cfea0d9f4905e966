pub mod s2;
