// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::errors::*;

/// Byte codec for entity content.
///
/// The index itself never serializes content; this seam exists for layers
/// that persist or transmit entities and resolve them back through the
/// store.
pub trait ContentCodec<C>: Send + Sync {
    fn serialize(&self, content: &C) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<C>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Utf8Codec;

    impl ContentCodec<String> for Utf8Codec {
        fn serialize(&self, content: &String) -> Result<Vec<u8>> {
            Ok(content.as_bytes().to_vec())
        }

        fn deserialize(&self, bytes: &[u8]) -> Result<String> {
            String::from_utf8(bytes.to_vec())
                .chain_err(|| "content bytes are not valid utf-8")
        }
    }

    #[test]
    fn test_codec_roundtrip() {
        let codec = Utf8Codec;
        let bytes = codec.serialize(&"beacon".to_string()).unwrap();
        assert_eq!(codec.deserialize(&bytes).unwrap(), "beacon");
        assert!(codec.deserialize(&[0xff, 0xfe]).is_err());
    }
}
