pub mod public_dtos;
