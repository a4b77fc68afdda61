use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Prompt themes offered for generated testimonials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestimonialTheme {
    Price,
    Timely,
    Cordial,
    Clean,
    Quality,
    Overall,
}

impl TestimonialTheme {
    pub const ALL: [TestimonialTheme; 6] = [
        TestimonialTheme::Price,
        TestimonialTheme::Timely,
        TestimonialTheme::Cordial,
        TestimonialTheme::Clean,
        TestimonialTheme::Quality,
        TestimonialTheme::Overall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestimonialTheme::Price => "price",
            TestimonialTheme::Timely => "timely",
            TestimonialTheme::Cordial => "cordial",
            TestimonialTheme::Clean => "clean",
            TestimonialTheme::Quality => "quality",
            TestimonialTheme::Overall => "overall",
        }
    }
}

impl FromStr for TestimonialTheme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TestimonialTheme::ALL
            .into_iter()
            .find(|theme| theme.as_str() == wanted)
            .ok_or_else(|| AppError::invalid_data(format!("Unknown testimonial theme: {s}")))
    }
}

impl fmt::Display for TestimonialTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
