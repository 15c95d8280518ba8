// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    fmt,
    iter::Sum,
    ops::{Add, Sub},
};

use serde::{Deserialize, Serialize};

/// A monetary value in satoshis.
///
/// Protocol arithmetic on escrow amounts, fees and bonds goes through this newtype rather than
/// bare `u64`s so that unit mistakes surface as type errors. Conversions to the transaction
/// layer's `bitcoin::Amount` happen only at the template boundary.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Satoshi(u64);

impl Satoshi {
    pub const ZERO: Satoshi = Satoshi(0);

    pub const fn new(sats: u64) -> Self {
        Satoshi(sats)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Satoshi) -> Option<Satoshi> {
        self.0.checked_add(other.0).map(Satoshi)
    }

    pub fn checked_sub(self, other: Satoshi) -> Option<Satoshi> {
        self.0.checked_sub(other.0).map(Satoshi)
    }

    pub fn saturating_sub(self, other: Satoshi) -> Satoshi {
        Satoshi(self.0.saturating_sub(other.0))
    }

    /// Integer division, used for ratio floors such as "bond must cover a tenth of the job".
    pub const fn div_floor(self, divisor: u64) -> Satoshi {
        Satoshi(self.0 / divisor)
    }

    pub fn to_amount(self) -> bitcoin::Amount {
        bitcoin::Amount::from_sat(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Satoshi {
    fn from(sats: u64) -> Self {
        Satoshi(sats)
    }
}

impl From<Satoshi> for u64 {
    fn from(s: Satoshi) -> Self {
        s.0
    }
}

impl From<bitcoin::Amount> for Satoshi {
    fn from(amount: bitcoin::Amount) -> Self {
        Satoshi(amount.to_sat())
    }
}

impl Add for Satoshi {
    type Output = Satoshi;

    fn add(self, rhs: Satoshi) -> Satoshi {
        Satoshi(self.0 + rhs.0)
    }
}

impl Sub for Satoshi {
    type Output = Satoshi;

    fn sub(self, rhs: Satoshi) -> Satoshi {
        Satoshi(self.0 - rhs.0)
    }
}

impl Sum for Satoshi {
    fn sum<I: Iterator<Item = Satoshi>>(iter: I) -> Self {
        iter.fold(Satoshi::ZERO, Add::add)
    }
}

impl PartialEq<u64> for Satoshi {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Satoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sats", self.0)
    }
}

impl fmt::Debug for Satoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Satoshi({})", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::Satoshi;

    #[test]
    fn checked_arithmetic() {
        let a = Satoshi::new(100_000);
        let b = Satoshi::new(40_000);
        assert_eq!(a.checked_add(b), Some(Satoshi::new(140_000)));
        assert_eq!(a.checked_sub(b), Some(Satoshi::new(60_000)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(Satoshi::new(u64::MAX).checked_add(Satoshi::new(1)), None);
    }

    #[test]
    fn ratio_floors() {
        assert_eq!(Satoshi::new(1_000_000).div_floor(10), Satoshi::new(100_000));
        assert_eq!(Satoshi::new(9).div_floor(10), Satoshi::ZERO);
    }

    #[test]
    fn amount_round_trip() {
        let s = Satoshi::new(123_456);
        assert_eq!(Satoshi::from(s.to_amount()), s);
    }
}
