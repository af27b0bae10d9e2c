//! Dynamic properties.
//!
//! Pipeline stages expose their tunable values as named, bounded properties. This allows
//! validating a whole configuration at the boundary and overriding individual values from
//! text (`name=value`) without each caller knowing the configuration layout.

use anyhow::{anyhow, bail, Result};

/// Object with custom properties.
pub trait Properties {
    /// Get available properties.
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![]
    }

    fn props(&mut self) -> Vec<(&str, Property)> {
        self.props_mut()
            .into_iter()
            .map(|(n, p)| (n, p.into()))
            .collect()
    }

    /// Check that every property lies within its bounds.
    fn validate_props(&mut self) -> Result<()> {
        for (name, prop) in self.props() {
            prop.check(name)?;
        }
        Ok(())
    }

    /// Set a single property from its textual representation.
    ///
    /// # Arguments
    ///
    /// * `name` - name of the property, as returned by `props_mut`.
    /// * `value` - textual value to parse.
    fn set_prop(&mut self, name: &str, value: &str) -> Result<()> {
        let mut props = self.props_mut();

        let (_, prop) = props
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| anyhow!("Unknown property: {name}"))?;

        prop.parse_set(value)
            .map_err(|e| anyhow!("Invalid value for {name}: {e}"))
    }
}

/// Property with a lower and upper bound.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct BoundedProp<T> {
    pub val: T,
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> BoundedProp<T> {
    /// Whether the value lies within `[min; max]`.
    ///
    /// NaN values are never in bounds.
    pub fn in_bounds(&self) -> bool {
        self.val >= self.min && self.val <= self.max
    }
}

impl<'a, T: Copy> From<BoundedPropMut<'a, T>> for BoundedProp<T> {
    fn from(BoundedPropMut { val, min, max }: BoundedPropMut<'a, T>) -> Self {
        Self {
            val: *val,
            min,
            max,
        }
    }
}

/// Enumeration whose variants can be picked by name.
pub trait Choice: Copy + PartialEq + 'static {
    /// Every variant along with its name.
    fn variants() -> &'static [(&'static str, Self)];
}

/// Type-erased access to a [`Choice`].
pub trait ChoiceMut {
    /// Name of the selected variant.
    fn selected(&self) -> &'static str;

    fn options(&self) -> Vec<&'static str>;

    /// Select a variant by its name.
    fn select(&mut self, name: &str) -> Result<()>;
}

impl<T: Choice> ChoiceMut for T {
    fn selected(&self) -> &'static str {
        T::variants()
            .iter()
            .find(|(_, v)| v == self)
            .map(|(n, _)| *n)
            .unwrap_or_default()
    }

    fn options(&self) -> Vec<&'static str> {
        T::variants().iter().map(|(n, _)| *n).collect()
    }

    fn select(&mut self, name: &str) -> Result<()> {
        *self = T::variants()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| anyhow!("expected one of: {}", self.options().join(", ")))?;
        Ok(())
    }
}

/// Snapshot of a [`Choice`] property.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ChoiceProp {
    pub val: String,
    pub options: Vec<String>,
}

/// Describes the type of a property.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Property {
    Bool(bool),
    Float(BoundedProp<f32>),
    Usize(BoundedProp<usize>),
    Choice(ChoiceProp),
}

impl<'a> From<PropertyMut<'a>> for Property {
    fn from(prop: PropertyMut<'a>) -> Self {
        match prop {
            PropertyMut::Bool(b) => Self::Bool(*b),
            PropertyMut::Float(p) => Self::Float(p.into()),
            PropertyMut::Usize(p) => Self::Usize(p.into()),
            PropertyMut::Choice(c) => Self::Choice(ChoiceProp {
                val: c.selected().into(),
                options: c.options().into_iter().map(Into::into).collect(),
            }),
        }
    }
}

impl Property {
    /// Verify the property lies within its bounds.
    pub fn check(&self, name: &str) -> Result<()> {
        match self {
            Self::Bool(_) | Self::Choice(_) => Ok(()),
            Self::Float(p) if !p.in_bounds() => {
                bail!("{name} = {} is outside [{}; {}]", p.val, p.min, p.max)
            }
            Self::Usize(p) if !p.in_bounds() => {
                bail!("{name} = {} is outside [{}; {}]", p.val, p.min, p.max)
            }
            _ => Ok(()),
        }
    }
}

/// Mutable view of a bounded property.
pub struct BoundedPropMut<'a, T> {
    pub val: &'a mut T,
    pub min: T,
    pub max: T,
}

/// Mutable view of a property.
pub enum PropertyMut<'a> {
    Bool(&'a mut bool),
    Float(BoundedPropMut<'a, f32>),
    Usize(BoundedPropMut<'a, usize>),
    Choice(&'a mut dyn ChoiceMut),
}

impl<'a> PropertyMut<'a> {
    /// Create a boolean property.
    ///
    /// # Arguments
    ///
    /// * `b` - reference to the underlying boolean to be mutated.
    pub fn bool(b: &'a mut bool) -> Self {
        Self::Bool(b)
    }

    /// Create a floating point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying float to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn float(val: &'a mut f32, min: f32, max: f32) -> Self {
        Self::Float(BoundedPropMut { val, min, max })
    }

    /// Create an integer point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying usize to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn usize(val: &'a mut usize, min: usize, max: usize) -> Self {
        Self::Usize(BoundedPropMut { val, min, max })
    }

    /// Create a property selecting one of the variants of an enumeration.
    pub fn choice(val: &'a mut impl Choice) -> Self {
        Self::Choice(val)
    }

    /// Parse a value and store it.
    ///
    /// Bounds are not enforced here, only type correctness. Use `Properties::validate_props`
    /// once all values are set.
    pub fn parse_set(&mut self, value: &str) -> Result<()> {
        let value = value.trim();
        match self {
            Self::Bool(b) => **b = value.parse()?,
            Self::Float(p) => *p.val = value.parse()?,
            Self::Usize(p) => *p.val = value.parse()?,
            Self::Choice(c) => c.select(value)?,
        }
        Ok(())
    }
}
