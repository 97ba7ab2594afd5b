/// Calculate the checksum of a packet body.
///
/// The checksum is the bitwise complement of the 8-bit sum of every byte
/// from the packet ID up to and including the last parameter.
/// The two `0xFF` header bytes are never part of the sum.
pub fn calculate_checksum(body: &[u8]) -> u8 {
	let sum = body.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
	!sum
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn test_calculate_checksum() {
		// PING to servo 1: ID LEN INST
		assert!(calculate_checksum(&[0x01, 0x02, 0x01]) == 0xFB);
		// Empty body sums to zero.
		assert!(calculate_checksum(&[]) == 0xFF);
		// Sum wraps at 8 bits before complementing.
		assert!(calculate_checksum(&[0xFF, 0xFF, 0x02]) == !0x00u8);
	}

	#[test]
	fn test_checksum_matches_complement_relation() {
		// For any body, appending the checksum makes the complemented sum zero.
		let bodies: &[&[u8]] = &[
			&[0x0B, 0x04, 0x02, 0x38, 0x02],
			&[0xFE, 0x07, 0x83, 0x2A, 0x02, 0x0B, 0xFF, 0x09],
			&[0x01, 0x02, 0x01],
		];
		for body in bodies {
			let checksum = calculate_checksum(body);
			let total = body.iter().fold(checksum, |sum, &byte| sum.wrapping_add(byte));
			assert!(total == 0xFF, "body {:02X?}", body);
		}
	}
}
