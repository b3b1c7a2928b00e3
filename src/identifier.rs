// 🧾 Identifier Validator - CNPJ check digits (modulo 11)
//
// A CNPJ is 14 digits: 12 base digits followed by 2 check digits.
// Formatting characters ("11.222.333/0001-81") are ignored.

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Keep only the ASCII digits of an identifier
pub fn digits_only(identifier: &str) -> String {
    identifier.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

/// Validate a CNPJ. Malformed input is simply invalid, never an error.
pub fn is_valid_cnpj(identifier: &str) -> bool {
    let digits: Vec<u32> = identifier
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != 14 {
        return false;
    }

    // 00000000000000, 11111111111111, ... pass the checksum but are not real
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &FIRST_WEIGHTS);
    if digits[12] != first {
        return false;
    }

    let second = check_digit(&digits[..13], &SECOND_WEIGHTS);
    digits[13] == second
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cnpj() {
        assert!(is_valid_cnpj("11222333000181"));
        assert!(is_valid_cnpj("11.222.333/0001-81"));
        assert!(is_valid_cnpj("33445566000186"));
        assert!(is_valid_cnpj("00000001000136"));
    }

    #[test]
    fn test_flipped_check_digits() {
        assert!(!is_valid_cnpj("11222333000191"));
        assert!(!is_valid_cnpj("11222333000182"));
    }

    #[test]
    fn test_repeated_digits_rejected() {
        for d in 0..=9 {
            let id = d.to_string().repeat(14);
            assert!(!is_valid_cnpj(&id), "{} should be invalid", id);
        }
    }

    #[test]
    fn test_wrong_length() {
        assert!(!is_valid_cnpj(""));
        assert!(!is_valid_cnpj("1122233300018"));
        assert!(!is_valid_cnpj("112223330001810"));
        assert!(!is_valid_cnpj("not a cnpj"));
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("11.222.333/0001-81"), "11222333000181");
        // non-ASCII digits are not CNPJ digits
        assert!(!is_valid_cnpj("١١222333000181"));
    }
}
