use super::{Agent, JsResult, PropertyKey};
use crate::types::{JsString, JsValue, index_of_units};

const DOLLAR: u16 = b'$' as u16;

fn is_digit(unit: u16) -> bool {
    (b'0' as u16..=b'9' as u16).contains(&unit)
}

fn digit_value(unit: u16) -> usize {
    (unit - b'0' as u16) as usize
}

impl Agent {
    fn capture_to_units(&mut self, capture: &JsValue) -> JsResult<Vec<u16>> {
        if capture.is_undefined() {
            return Ok(Vec::new());
        }
        Ok(self.to_string(capture)?.code_units)
    }

    // §22.1.3.19.1 GetSubstitution(matched, str, position, captures, namedCaptures, replacementTemplate)
    pub fn get_substitution(
        &mut self,
        matched: &JsString,
        string: &JsString,
        position: usize,
        captures: &[JsValue],
        named_captures: &JsValue,
        replacement_template: &JsValue,
    ) -> JsResult<JsString> {
        let subject = string.as_code_units();
        let string_length = subject.len();
        debug_assert!(position <= string_length);

        let template = self.to_string(replacement_template)?;
        let template = template.as_code_units();
        let mut result: Vec<u16> = Vec::with_capacity(template.len());
        let mut rest = template;

        while !rest.is_empty() {
            let Some(next) = rest.get(1).copied().filter(|_| rest[0] == DOLLAR) else {
                result.push(rest[0]);
                rest = &rest[1..];
                continue;
            };
            let ref_length = match next {
                DOLLAR => {
                    result.push(DOLLAR);
                    2
                }
                u if u == b'`' as u16 => {
                    result.extend_from_slice(&subject[..position]);
                    2
                }
                u if u == b'&' as u16 => {
                    result.extend_from_slice(matched.as_code_units());
                    2
                }
                u if u == b'\'' as u16 => {
                    let tail_position = (position + matched.len()).min(string_length);
                    result.extend_from_slice(&subject[tail_position..]);
                    2
                }
                u if is_digit(u) => {
                    let mut digit_count = if rest.get(2).is_some_and(|d| is_digit(*d)) { 2 } else { 1 };
                    let mut index = digit_value(u);
                    if digit_count == 2 {
                        let two_digit = index * 10 + digit_value(rest[2]);
                        if two_digit > captures.len() {
                            digit_count = 1;
                        } else {
                            index = two_digit;
                        }
                    }
                    let ref_length = 1 + digit_count;
                    if (1..=captures.len()).contains(&index) {
                        let units = self.capture_to_units(&captures[index - 1])?;
                        result.extend_from_slice(&units);
                    } else {
                        result.extend_from_slice(&rest[..ref_length]);
                    }
                    ref_length
                }
                u if u == b'<' as u16 => {
                    let greater_than = index_of_units(rest, &[b'>' as u16], 2);
                    match (greater_than, named_captures) {
                        (Some(gt), JsValue::Object(groups)) => {
                            let group_name = JsString::from_code_units(rest[2..gt].to_vec());
                            let receiver = named_captures.clone();
                            let capture = self.get(groups, &PropertyKey::from(group_name), &receiver)?;
                            let units = self.capture_to_units(&capture)?;
                            result.extend_from_slice(&units);
                            gt + 1
                        }
                        _ => {
                            result.extend_from_slice(&rest[..2]);
                            2
                        }
                    }
                }
                _ => {
                    result.push(DOLLAR);
                    1
                }
            };
            rest = &rest[ref_length..];
        }
        Ok(JsString::from_code_units(result))
    }
}
