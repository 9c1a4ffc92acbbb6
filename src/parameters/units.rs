//! Physical units and quantities
//!
//! A minimal unit algebra covering the units that show up on model parameters
//! and in event file headers: products of known symbols raised to integer powers,
//! written either in FITS form (`"cm-2 s-1 TeV-1"`) or with explicit operators
//! (`"erg / s"`, `"m**2 * s"`).

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, multispace0, one_of},
    combinator::opt,
    number::complete::double,
    sequence::{pair, preceded},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing or converting units
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Failed to parse unit '{input}': {message}")]
    Parse { input: String, message: String },

    #[error("Unknown unit symbol '{symbol}'")]
    UnknownSymbol { symbol: String },

    #[error("Unit '{from}' is not convertible to '{to}'")]
    Incompatible { from: String, to: String },
}

/// Dimension exponents: length, mass, time, angle
type Dimension = [i32; 4];

const LENGTH: Dimension = [1, 0, 0, 0];
const MASS: Dimension = [0, 1, 0, 0];
const TIME: Dimension = [0, 0, 1, 0];
const ANGLE: Dimension = [0, 0, 0, 1];
const SOLID_ANGLE: Dimension = [0, 0, 0, 2];
const ENERGY: Dimension = [2, 1, -2, 0];
const FREQUENCY: Dimension = [0, 0, -1, 0];

const PARSEC: f64 = 3.085_677_581_491_367_3e16;
const ELECTRON_VOLT: f64 = 1.602_176_634e-19;

/// SI scale and dimension of a known symbol
fn lookup(symbol: &str) -> Option<(f64, Dimension)> {
    let entry = match symbol {
        "m" => (1.0, LENGTH),
        "mm" => (1e-3, LENGTH),
        "cm" => (1e-2, LENGTH),
        "km" => (1e3, LENGTH),
        "AU" => (1.495_978_707e11, LENGTH),
        "pc" => (PARSEC, LENGTH),
        "kpc" => (PARSEC * 1e3, LENGTH),
        "Mpc" => (PARSEC * 1e6, LENGTH),
        "g" => (1e-3, MASS),
        "kg" => (1.0, MASS),
        "s" => (1.0, TIME),
        "ms" => (1e-3, TIME),
        "min" => (60.0, TIME),
        "h" => (3600.0, TIME),
        "d" => (86400.0, TIME),
        "yr" => (31_557_600.0, TIME),
        "Hz" => (1.0, FREQUENCY),
        "J" => (1.0, ENERGY),
        "erg" => (1e-7, ENERGY),
        "eV" => (ELECTRON_VOLT, ENERGY),
        "keV" => (ELECTRON_VOLT * 1e3, ENERGY),
        "MeV" => (ELECTRON_VOLT * 1e6, ENERGY),
        "GeV" => (ELECTRON_VOLT * 1e9, ENERGY),
        "TeV" => (ELECTRON_VOLT * 1e12, ENERGY),
        "PeV" => (ELECTRON_VOLT * 1e15, ENERGY),
        "rad" => (1.0, ANGLE),
        "deg" => (PI / 180.0, ANGLE),
        "arcmin" => (PI / 10_800.0, ANGLE),
        "arcsec" => (PI / 648_000.0, ANGLE),
        "sr" => (1.0, SOLID_ANGLE),
        _ => return None,
    };
    Some(entry)
}

/// A physical unit: an ordered product of known symbols raised to integer powers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Unit {
    terms: Vec<(String, i32)>,
}

impl Unit {
    /// The dimensionless unit
    pub fn dimensionless() -> Self {
        Self::default()
    }

    /// Parse a unit string
    ///
    /// # Examples
    ///
    /// ```
    /// use gammafit_rs::parameters::Unit;
    ///
    /// let unit = Unit::parse("cm-2 s-1 TeV-1").unwrap();
    /// assert_eq!(unit.to_fits_string(), "cm-2 s-1 TeV-1");
    ///
    /// let same = Unit::parse("1 / (cm2 s TeV)");
    /// assert!(same.is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, UnitError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::dimensionless());
        }

        let terms = match unit_terms(trimmed) {
            Ok((remainder, terms)) if remainder.trim().is_empty() => terms,
            Ok((remainder, _)) => {
                return Err(UnitError::Parse {
                    input: input.to_string(),
                    message: format!("unexpected trailing characters '{}'", remainder),
                })
            }
            Err(e) => {
                return Err(UnitError::Parse {
                    input: input.to_string(),
                    message: format!("{:?}", e),
                })
            }
        };

        let mut unit = Self::dimensionless();
        for (symbol, power) in terms {
            if lookup(&symbol).is_none() {
                return Err(UnitError::UnknownSymbol { symbol });
            }
            unit.push(symbol, power);
        }
        Ok(unit)
    }

    fn push(&mut self, symbol: String, power: i32) {
        match self.terms.iter_mut().find(|(s, _)| *s == symbol) {
            Some(term) => term.1 += power,
            None => self.terms.push((symbol, power)),
        }
        self.terms.retain(|(_, p)| *p != 0);
    }

    /// Whether the unit has no terms at all
    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    fn dimension(&self) -> Dimension {
        let mut dim = [0; 4];
        for (symbol, power) in &self.terms {
            // Symbols are validated on construction
            if let Some((_, d)) = lookup(symbol) {
                for (acc, exp) in dim.iter_mut().zip(d.iter()) {
                    *acc += exp * power;
                }
            }
        }
        dim
    }

    fn si_scale(&self) -> f64 {
        self.terms
            .iter()
            .filter_map(|(symbol, power)| lookup(symbol).map(|(s, _)| s.powi(*power)))
            .product()
    }

    /// Whether values in this unit can be converted to `other`
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        self.dimension() == other.dimension()
    }

    /// Multiplicative factor converting a value in `self` into `other`
    pub fn conversion_factor(&self, other: &Unit) -> Result<f64, UnitError> {
        if !self.is_equivalent(other) {
            return Err(UnitError::Incompatible {
                from: self.to_fits_string(),
                to: other.to_fits_string(),
            });
        }
        Ok(self.si_scale() / other.si_scale())
    }

    /// FITS-compatible string form, e.g. `"cm-2 s-1 TeV-1"`
    pub fn to_fits_string(&self) -> String {
        self.terms
            .iter()
            .map(|(symbol, power)| match power {
                1 => symbol.clone(),
                p => format!("{}{}", symbol, p),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fits_string())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::parse(s)
    }
}

impl TryFrom<String> for Unit {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Unit::parse(&value)
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_fits_string()
    }
}

/// A value with a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Parse a quantity string such as `"2.3 TeV"` or `"1e-12 cm-2 s-1 TeV-1"`
    pub fn parse(input: &str) -> Result<Self, UnitError> {
        let trimmed = input.trim();
        let parsed: IResult<&str, f64> = double::<&str, nom::error::Error<&str>>(trimmed);
        match parsed {
            Ok((rest, value)) => Ok(Self {
                value,
                unit: Unit::parse(rest)?,
            }),
            Err(e) => Err(UnitError::Parse {
                input: input.to_string(),
                message: format!("{:?}", e),
            }),
        }
    }

    /// The numeric value expressed in `unit`
    pub fn value_in(&self, unit: &Unit) -> Result<f64, UnitError> {
        Ok(self.value * self.unit.conversion_factor(unit)?)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_dimensionless() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

// Parser functions using nom

/// Parse one `symbol[power]` term, accepting `cm-2`, `cm^-2` and `cm**-2`
fn unit_term(input: &str) -> IResult<&str, (String, i32)> {
    let mut parser = pair(
        alpha1::<&str, nom::error::Error<&str>>,
        opt(preceded(
            opt(alt((tag("**"), tag("^")))),
            nom::character::complete::i32,
        )),
    );
    let (input, (symbol, power)) = parser.parse(input)?;
    Ok((input, (symbol.to_string(), power.unwrap_or(1))))
}

/// Parse a sequence of terms joined by whitespace, `*`, `.` or `/`
fn unit_terms(input: &str) -> IResult<&str, Vec<(String, i32)>> {
    let (mut input, first) = unit_term(input)?;
    let mut terms = vec![first];

    loop {
        let (rest, _) = multispace0::<&str, nom::error::Error<&str>>.parse(input)?;
        if rest.is_empty() {
            return Ok((rest, terms));
        }

        let mut op_parser = one_of::<_, _, nom::error::Error<&str>>("*./");
        let (rest, divide) = match op_parser.parse(rest) {
            Ok((after_op, op)) => {
                let (after_op, _) = multispace0::<&str, nom::error::Error<&str>>.parse(after_op)?;
                (after_op, op == '/')
            }
            Err(_) => (rest, false),
        };

        match unit_term(rest) {
            Ok((after_term, (symbol, power))) => {
                terms.push((symbol, if divide { -power } else { power }));
                input = after_term;
            }
            Err(_) => return Ok((input, terms)),
        }
    }
}
