/// Mod-10 (Luhn) check for order numbers and withdrawal receipts.
///
/// Only non-empty strings of ASCII digits can be valid.
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (i, byte) in number.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(byte - b'0');
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_numbers() {
        assert!(is_valid("79927398713"));
        assert!(is_valid("4561261212345467"));
        assert!(is_valid("2377225624"));
        assert!(!is_valid("79927398710"));
        assert!(!is_valid("1234"));
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(!is_valid(""));
        assert!(!is_valid("7992 7398 713"));
        assert!(!is_valid("-79927398713"));
        assert!(!is_valid("７９"));
    }

    fn check_digit(payload: &str) -> char {
        (0..10u8)
            .map(|d| (b'0' + d) as char)
            .find(|d| is_valid(&format!("{}{}", payload, d)))
            .unwrap()
    }

    proptest! {
        #[test]
        fn exactly_one_check_digit_validates(payload in "[0-9]{1,18}") {
            let valid: Vec<_> = (0..10u8)
                .filter(|d| is_valid(&format!("{}{}", payload, d)))
                .collect();
            prop_assert_eq!(valid.len(), 1);
        }

        #[test]
        fn single_digit_typo_is_detected(payload in "[0-9]{2,18}", pos in 0usize..18, bump in 1u8..10) {
            let number = format!("{}{}", payload, check_digit(&payload));
            let pos = pos % number.len();
            let mut bytes = number.into_bytes();
            bytes[pos] = b'0' + (bytes[pos] - b'0' + bump) % 10;
            prop_assert!(!is_valid(std::str::from_utf8(&bytes).unwrap()));
        }
    }
}
