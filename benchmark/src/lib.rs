// Intentionally empty: this package exists to host the criterion benches.
