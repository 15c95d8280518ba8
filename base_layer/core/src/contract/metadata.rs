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

use mmp_common_types::{
    types::{BlockHeight, EpochSeconds},
    Satoshi,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{
        MAX_DESCRIPTION_LENGTH,
        MAX_JOB_AMOUNT,
        MAX_TIMEOUT_BLOCKS,
        MAX_TITLE_LENGTH,
        MIN_JOB_AMOUNT,
        MIN_TIMEOUT_BLOCKS,
    },
    contract::error::MetadataError,
};

/// The employer-authored description of a job, fixed at posting time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub title: String,
    pub description: String,
    pub amount: Satoshi,
    pub created_height: BlockHeight,
    pub created_timestamp: EpochSeconds,
    pub timeout_blocks: u64,
    pub requirements: String,
    pub deliverables: String,
}

impl JobMetadata {
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.title.is_empty() {
            return Err(MetadataError::EmptyTitle);
        }
        if self.title.len() > MAX_TITLE_LENGTH {
            return Err(MetadataError::TitleTooLong(MAX_TITLE_LENGTH));
        }
        if self.description.is_empty() {
            return Err(MetadataError::EmptyDescription);
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(MetadataError::DescriptionTooLong(MAX_DESCRIPTION_LENGTH));
        }
        if self.amount < MIN_JOB_AMOUNT || self.amount > MAX_JOB_AMOUNT {
            return Err(MetadataError::AmountOutOfRange(self.amount));
        }
        if self.timeout_blocks < MIN_TIMEOUT_BLOCKS || self.timeout_blocks > MAX_TIMEOUT_BLOCKS {
            return Err(MetadataError::TimeoutOutOfRange(self.timeout_blocks));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use mmp_common_types::Satoshi;

    use super::JobMetadata;
    use crate::contract::error::MetadataError;

    fn sample() -> JobMetadata {
        JobMetadata {
            title: "Design a landing page".to_string(),
            description: "Static page, dark theme, deliver as a zip".to_string(),
            amount: Satoshi::new(100_000_000),
            created_height: 800_000,
            created_timestamp: 1_700_000_000,
            timeout_blocks: 144,
            requirements: "HTML/CSS".to_string(),
            deliverables: "zip archive".to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_metadata() {
        sample().validate().unwrap();
    }

    #[test]
    fn amount_boundaries() {
        let mut md = sample();
        md.amount = Satoshi::new(1_000);
        md.validate().unwrap();
        md.amount = Satoshi::new(999);
        assert!(matches!(md.validate(), Err(MetadataError::AmountOutOfRange(_))));
    }

    #[test]
    fn timeout_boundaries() {
        let mut md = sample();
        md.timeout_blocks = 6;
        md.validate().unwrap();
        md.timeout_blocks = 52_560;
        md.validate().unwrap();
        md.timeout_blocks = 5;
        assert!(matches!(md.validate(), Err(MetadataError::TimeoutOutOfRange(5))));
        md.timeout_blocks = 52_561;
        assert!(matches!(md.validate(), Err(MetadataError::TimeoutOutOfRange(52_561))));
    }

    #[test]
    fn rejects_empty_strings() {
        let mut md = sample();
        md.title = String::new();
        assert_eq!(md.validate(), Err(MetadataError::EmptyTitle));
        let mut md = sample();
        md.description = String::new();
        assert_eq!(md.validate(), Err(MetadataError::EmptyDescription));
    }
}
