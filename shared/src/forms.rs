//! Form state for the auth, profile setup and profile edit screens.

use serde::{Deserialize, Serialize};

use crate::validation::{require_city, require_name, validate_otp_code, ValidationError};
use crate::{OTP_CODE_LENGTH, OTP_RESEND_SECONDS};

pub const MOROCCAN_CITIES: &[&str] = &[
    "Agadir",
    "Al Hoceïma",
    "Béni Mellal",
    "Berrechid",
    "Casablanca",
    "Dakhla",
    "El Jadida",
    "Errachidia",
    "Essaouira",
    "Fès",
    "Guelmim",
    "Ifrane",
    "Kénitra",
    "Khémisset",
    "Khouribga",
    "Laâyoune",
    "Larache",
    "Marrakech",
    "Meknès",
    "Mohammedia",
    "Nador",
    "Ouarzazate",
    "Oujda",
    "Rabat",
    "Safi",
    "Salé",
    "Settat",
    "Tanger",
    "Taroudant",
    "Taza",
    "Témara",
    "Tétouan",
];

/// Case-insensitive substring match; an empty query keeps every city.
pub fn filter_cities(query: &str) -> Vec<&'static str> {
    let needle = query.trim().to_lowercase();
    MOROCCAN_CITIES
        .iter()
        .copied()
        .filter(|city| needle.is_empty() || city.to_lowercase().contains(&needle))
        .collect()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct LoginForm {
    pub identity: String,
    pub remember_me: bool,
    pub submitting: bool,
}

impl LoginForm {
    /// Prefilled from a remembered identity, with "remember me" checked.
    pub fn prefilled(remembered: Option<&str>) -> Self {
        match remembered {
            Some(identity) => Self {
                identity: identity.to_string(),
                remember_me: true,
                submitting: false,
            },
            None => Self::default(),
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.submitting && !self.identity.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OtpForm {
    digits: [Option<char>; OTP_CODE_LENGTH],
    focused: usize,
    seconds_left: u32,
    pub verifying: bool,
    pub resending: bool,
}

impl Default for OtpForm {
    fn default() -> Self {
        Self {
            digits: [None; OTP_CODE_LENGTH],
            focused: 0,
            seconds_left: OTP_RESEND_SECONDS,
            verifying: false,
            resending: false,
        }
    }
}

impl OtpForm {
    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn seconds_left(&self) -> u32 {
        self.seconds_left
    }

    pub fn cells(&self) -> Vec<String> {
        self.digits
            .iter()
            .map(|d| d.map(String::from).unwrap_or_default())
            .collect()
    }

    /// Writes the last digit typed into cell `index` and moves focus forward;
    /// an empty value clears the cell and moves focus back. Non-digits are
    /// ignored. Returns `true` once all cells are filled.
    pub fn enter(&mut self, index: usize, value: &str) -> bool {
        if index >= OTP_CODE_LENGTH {
            return self.is_complete();
        }
        if value.is_empty() {
            self.digits[index] = None;
            self.focused = index.saturating_sub(1);
            return false;
        }
        let Some(digit) = value.chars().rev().find(char::is_ascii_digit) else {
            return self.is_complete();
        };
        self.digits[index] = Some(digit);
        self.focused = (index + 1).min(OTP_CODE_LENGTH - 1);
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    pub fn code(&self) -> Result<String, ValidationError> {
        let code: String = self.digits.iter().flatten().collect();
        validate_otp_code(&code)
    }

    pub fn can_verify(&self) -> bool {
        !self.verifying && self.is_complete()
    }

    /// One shell tick; returns `true` while the countdown moved.
    pub fn tick(&mut self) -> bool {
        if self.seconds_left == 0 {
            return false;
        }
        self.seconds_left -= 1;
        true
    }

    pub fn can_resend(&self) -> bool {
        self.seconds_left == 0 && !self.resending
    }

    pub fn restart_countdown(&mut self) {
        self.seconds_left = OTP_RESEND_SECONDS;
    }

    pub fn clear_digits(&mut self) {
        self.digits = [None; OTP_CODE_LENGTH];
        self.focused = 0;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ProfileSetupForm {
    pub name: String,
    pub city_query: String,
    pub city: Option<String>,
    pub submitting: bool,
}

impl ProfileSetupForm {
    pub fn select_city(&mut self, city: &str) {
        self.city = Some(city.to_string());
        self.city_query.clear();
    }

    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let name = require_name(&self.name)?;
        let city = require_city(self.city.as_deref().unwrap_or_default())?;
        Ok((name, city))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct EditProfileForm {
    pub name: String,
    pub city: String,
    pub saving: bool,
}

impl EditProfileForm {
    pub fn prefilled(name: Option<&str>, city: Option<&str>) -> Self {
        Self {
            name: name.unwrap_or_default().to_string(),
            city: city.unwrap_or_default().to_string(),
            saving: false,
        }
    }

    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        Ok((require_name(&self.name)?, require_city(&self.city)?))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct PhoneChangeForm {
    pub new_phone: String,
    pub code: String,
    pub submitting: bool,
}
