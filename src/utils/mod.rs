//! Input validation and credential helpers shared by the service layer.

pub mod input_validation;
pub mod password_utils;
pub mod text_input;
