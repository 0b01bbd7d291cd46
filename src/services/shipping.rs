/// Upper bound (exclusive) of each band and the fee charged inside it.
const BANDS: [(f64, f64); 12] = [
    (500.0, 50.0),
    (1_000.0, 100.0),
    (2_000.0, 200.0),
    (3_000.0, 300.0),
    (4_000.0, 400.0),
    (5_000.0, 500.0),
    (6_000.0, 600.0),
    (7_000.0, 700.0),
    (8_000.0, 800.0),
    (9_000.0, 900.0),
    (10_000.0, 999.0),
    (30_000.0, 1_500.0),
];

/// Shipping fee for an order subtotal. Orders of 30,000 and above ship free.
pub fn shipping_fee(subtotal: f64) -> f64 {
    if subtotal.is_nan() || subtotal <= 0.0 {
        return 0.0;
    }
    BANDS
        .iter()
        .find(|(upper, _)| subtotal < *upper)
        .map(|(_, fee)| *fee)
        .unwrap_or(0.0)
}
